//! Multi-table tournaments: models and the supervisor actor.

pub mod models;
pub mod supervisor;

pub use models::{
    BlindLevel, Participant, ParticipantStatus, TournamentResultEntry, TournamentSettings,
    TournamentSnapshot, TournamentStatus,
};
pub use supervisor::{
    TournamentDirectory, TournamentError, TournamentHandle, TournamentMessage,
    TournamentSupervisor,
};
