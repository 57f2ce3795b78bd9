//! Wire protocol types shared by the runtime and the transport layer.

pub mod messages;

pub use messages::{ClientCommand, GameStateSnapshot, PlayerSnapshot, PotSnapshot, ServerEvent};
