//! Runtime-wide constants.

use crate::game::entities::Chips;

/// Hard cap on seats at any table.
pub const MAX_PLAYERS: usize = 10;

/// A hand needs at least this many players with chips.
pub const MIN_PLAYERS_TO_DEAL: usize = 2;

/// Default time a player has to act before the auto-action fires.
pub const DEFAULT_TURN_TIMEOUT_MILLIS: u64 = 30_000;

/// Default window a disconnected player has to reconnect before their
/// seat is flagged for vacation.
pub const DEFAULT_DISCONNECT_GRACE_MILLIS: u64 = 60_000;

/// Delay between one hand settling and the next hand being attempted.
pub const INTER_HAND_DELAY_MILLIS: u64 = 3_000;

/// Lead time for the tournament level warning before a blind advance.
pub const LEVEL_WARNING_LEAD_MILLIS: u64 = 30_000;

/// Private-table join codes are exactly this many characters of `[A-Z0-9]`.
pub const JOIN_CODE_LEN: usize = 5;

/// Per-socket command budget enforced by the session router.
pub const DEFAULT_COMMANDS_PER_SECOND: usize = 20;

/// Default cash-game buy-in when a variant does not override it.
pub const DEFAULT_BUY_IN: Chips = 600;
