//! Authoritative real-time poker runtime.
//!
//! The server side of a multiplayer poker service: per-table hand state
//! machines, seat/turn/pot logic, turn timers with auto-fold, the
//! reconnection and ghost model, private-table host controls, matchmaking
//! queues, and a tournament supervisor with blind clock, elimination, and
//! table balancing. Tables and tournaments are single-writer actors; all
//! timing flows through a monotonic [`clock::Clock`] so tests drive virtual
//! time.

pub mod broadcast;
pub mod clock;
pub mod connection;
pub mod constants;
pub mod db;
pub mod game;
pub mod history;
pub mod matchmaker;
pub mod net;
pub mod sessions;
pub mod table;
pub mod tournament;

pub use broadcast::Broadcaster;
pub use clock::{Clock, SystemClock, VirtualClock};
pub use connection::ConnectionRegistry;
pub use game::entities::{
    Blinds, Card, Chips, HandPhase, Player, PlayerAction, PlayerStatus, SeatNumber, TableId,
    TournamentId, UnixMillis, UserId, Variant, VariantCategory,
};
pub use matchmaker::{Matchmaker, MatchmakerError};
pub use net::{ClientCommand, GameStateSnapshot, ServerEvent};
pub use sessions::ActiveSessions;
pub use table::{TableConfig, TableDeps, TableError, TableHandle, TableManager};
pub use tournament::{TournamentDirectory, TournamentError, TournamentHandle};
