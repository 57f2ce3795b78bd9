//! Table ownership: actor, configuration, messages, and the directory that
//! mints and resolves tables.

pub mod actor;
pub mod config;
pub mod manager;
pub mod messages;

pub use actor::{TableActor, TableDeps};
pub use config::TableConfig;
pub use manager::TableManager;
pub use messages::{JoinOutcome, TableError, TableHandle, TableMessage, TableSettlement};
