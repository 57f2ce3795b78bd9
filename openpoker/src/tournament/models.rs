//! Tournament data models.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants;
use crate::game::entities::{Chips, SeatNumber, TableId, TournamentId, UnixMillis, UserId};

/// Tournament lifecycle. `Cancelled` is reachable from any non-terminal
/// status; `Completed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Setup,
    Registration,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl TournamentStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Setup => "setup",
            Self::Registration => "registration",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Registered,
    Active,
    Eliminated,
    Transferred,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Eliminated => "eliminated",
            Self::Transferred => "transferred",
        };
        write!(f, "{repr}")
    }
}

/// One level of the blind structure template.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlindLevel {
    pub small: Chips,
    pub big: Chips,
}

/// Host-editable tournament configuration, valid only while in `Setup`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TournamentSettings {
    pub title: String,
    pub max_players: Option<usize>,
    pub max_players_per_table: usize,
    pub starting_stack: Chips,
    pub blind_structure: Vec<BlindLevel>,
    pub blind_level_duration_millis: u64,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            title: "Tournament".to_string(),
            max_players: None,
            max_players_per_table: 9,
            starting_stack: 1_500,
            blind_structure: vec![
                BlindLevel { small: 10, big: 20 },
                BlindLevel { small: 15, big: 30 },
                BlindLevel { small: 25, big: 50 },
                BlindLevel { small: 50, big: 100 },
                BlindLevel { small: 75, big: 150 },
                BlindLevel { small: 100, big: 200 },
            ],
            blind_level_duration_millis: 600_000,
        }
    }
}

impl TournamentSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(2..=constants::MAX_PLAYERS).contains(&self.max_players_per_table) {
            return Err("Invalid players per table".to_string());
        }
        if self.starting_stack == 0 {
            return Err("Invalid starting stack".to_string());
        }
        if self.blind_structure.is_empty() {
            return Err("Invalid blinds".to_string());
        }
        if self.blind_level_duration_millis == 0 {
            return Err("Invalid level duration".to_string());
        }
        let mut prev_small = 0;
        for level in &self.blind_structure {
            if level.big <= level.small || level.small < prev_small {
                return Err("Invalid blinds".to_string());
            }
            prev_small = level.small;
        }
        Ok(())
    }

    /// Blind level by index, clamped to the last defined level.
    #[must_use]
    pub fn level(&self, index: usize) -> BlindLevel {
        let clamped = index.min(self.blind_structure.len().saturating_sub(1));
        self.blind_structure[clamped]
    }
}

/// Supervisor-owned participant record. Survives until the tournament
/// reaches a terminal status.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Participant {
    pub user_id: UserId,
    pub status: ParticipantStatus,
    pub current_stack: Chips,
    pub current_table_id: Option<TableId>,
    pub current_seat: Option<SeatNumber>,
    pub eliminated_at: Option<UnixMillis>,
    pub finish_position: Option<usize>,
}

impl Participant {
    #[must_use]
    pub fn registered(user_id: UserId) -> Self {
        Self {
            user_id,
            status: ParticipantStatus::Registered,
            current_stack: 0,
            current_table_id: None,
            current_seat: None,
            eliminated_at: None,
            finish_position: None,
        }
    }
}

/// Final standing entry in `tournament_completed`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TournamentResultEntry {
    pub user_id: UserId,
    pub finish_position: usize,
}

/// Read-only view served for `get_tournament_state`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TournamentSnapshot {
    pub tournament_id: TournamentId,
    pub host_id: UserId,
    pub title: String,
    pub status: TournamentStatus,
    pub settings: TournamentSettings,
    pub participants: Vec<Participant>,
    pub current_blind_level: usize,
    pub level_ends_at: Option<UnixMillis>,
    pub table_ids: Vec<TableId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        assert!(TournamentSettings::default().validate().is_ok());
    }

    #[test]
    fn settings_reject_bad_table_size() {
        let mut s = TournamentSettings::default();
        s.max_players_per_table = 1;
        assert!(s.validate().is_err());
        s.max_players_per_table = 11;
        assert!(s.validate().is_err());
    }

    #[test]
    fn settings_reject_non_monotonic_blinds() {
        let mut s = TournamentSettings::default();
        s.blind_structure = vec![
            BlindLevel { small: 50, big: 100 },
            BlindLevel { small: 25, big: 50 },
        ];
        assert_eq!(s.validate().unwrap_err(), "Invalid blinds");
    }

    #[test]
    fn settings_reject_big_not_above_small() {
        let mut s = TournamentSettings::default();
        s.blind_structure = vec![BlindLevel { small: 50, big: 50 }];
        assert_eq!(s.validate().unwrap_err(), "Invalid blinds");
    }

    #[test]
    fn settings_reject_empty_structure() {
        let mut s = TournamentSettings::default();
        s.blind_structure.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn equal_consecutive_smalls_are_allowed() {
        let mut s = TournamentSettings::default();
        s.blind_structure = vec![
            BlindLevel { small: 10, big: 20 },
            BlindLevel { small: 10, big: 25 },
        ];
        assert!(s.validate().is_ok());
    }

    #[test]
    fn level_clamps_to_last() {
        let s = TournamentSettings::default();
        let last = *s.blind_structure.last().unwrap();
        assert_eq!(s.level(100), last);
        assert_eq!(s.level(0), s.blind_structure[0]);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TournamentStatus::Completed.is_terminal());
        assert!(TournamentStatus::Cancelled.is_terminal());
        assert!(!TournamentStatus::Paused.is_terminal());
        assert!(!TournamentStatus::Setup.is_terminal());
    }
}
