//! Client commands and server events.
//!
//! Every message is an internally tagged JSON object; snake_case is the one
//! canonical naming convention on the wire, and unknown tags are parse
//! errors rather than a degrade path. Snapshots are self-contained: clients
//! replace state wholesale, they never merge.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::game::entities::{
    Card, Chips, HandPhase, PlayerAction, PlayerStatus, SeatNumber, TableId, TournamentId,
    UnixMillis, UserId,
};
use crate::game::hand::Street;
use crate::tournament::models::{
    TournamentResultEntry, TournamentSettings, TournamentSnapshot, TournamentStatus,
};

/// Commands a client may send over its socket.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinGame {
        game_id: TableId,
    },
    LeaveGame {
        game_id: TableId,
    },
    Action {
        game_id: TableId,
        seat: SeatNumber,
        action: PlayerAction,
    },
    JoinQueue {
        queue_type: String,
    },
    LeaveQueue {
        queue_type: String,
    },
    CheckQueueStatus,
    CheckActiveSession,
    CheckActiveStatus,
    CreatePrivateTable {
        variant: String,
    },
    LookupJoinCode {
        code: String,
    },
    RequestSeat {
        game_id: TableId,
    },
    HostSelfSeat {
        game_id: TableId,
        seat_number: Option<SeatNumber>,
    },
    AdminAction {
        game_id: TableId,
        #[serde(flatten)]
        action: AdminCommand,
    },
    CreateTournament {
        settings: TournamentSettings,
    },
    RegisterTournament {
        tournament_id: TournamentId,
    },
    UnregisterTournament {
        tournament_id: TournamentId,
    },
    TournamentAdminAction {
        tournament_id: TournamentId,
        #[serde(flatten)]
        action: TournamentAdminCommand,
    },
    GetTournamentState {
        tournament_id: TournamentId,
    },
    JoinTournamentRoom {
        tournament_id: TournamentId,
    },
    JoinTable {
        table_id: TableId,
    },
}

/// Host-only table administration commands.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "admin", rename_all = "snake_case")]
pub enum AdminCommand {
    Pause,
    Resume,
    StartGame,
    Kick { user_id: UserId },
    Approve { user_id: UserId, chips: Option<Chips> },
    Reject { user_id: UserId },
    SetStack { user_id: UserId, chips: Chips },
    SetBlinds { small: Chips, big: Chips },
}

/// Host-only tournament administration commands.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "admin", rename_all = "snake_case")]
pub enum TournamentAdminCommand {
    UpdateSettings { settings: TournamentSettings },
    OpenRegistration,
    StartTournament,
    PauseTournament,
    ResumeTournament,
    CancelTournament,
    BanPlayer { user_id: UserId },
    RegisterPlayer { user_id: UserId },
    TransferPlayer { user_id: UserId },
}

/// One player's view inside a snapshot. Hole cards are `None` for other
/// seats unless showdown-revealed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub user_id: UserId,
    pub seat: SeatNumber,
    pub chips: Chips,
    pub current_bet: Chips,
    pub total_bet_this_hand: Chips,
    pub status: PlayerStatus,
    pub folded: bool,
    pub all_in: bool,
    pub hole_cards: Option<Vec<Card>>,
    pub revealed_indices: Vec<usize>,
    pub disconnect_deadline: Option<UnixMillis>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PotSnapshot {
    pub amount: Chips,
    pub eligible: Vec<UserId>,
}

/// Authoritative table snapshot. Emitted after every state-changing action
/// and on every successful `join_game`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameStateSnapshot {
    pub game_id: TableId,
    pub tournament_id: Option<TournamentId>,
    pub hand_number: u64,
    pub current_phase: HandPhase,
    pub players: Vec<PlayerSnapshot>,
    pub community_cards: Vec<Card>,
    pub pots: Vec<PotSnapshot>,
    pub button_seat: Option<SeatNumber>,
    pub sb_seat: Option<SeatNumber>,
    pub bb_seat: Option<SeatNumber>,
    pub current_actor_seat: Option<SeatNumber>,
    pub min_raise: Chips,
    pub last_raise_amount: Chips,
    pub high_bet: Chips,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub is_paused: bool,
}

/// End-of-game summary carried by `game_finished`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameStats {
    pub total_hands: u64,
    pub starting_stacks: HashMap<UserId, Chips>,
    pub final_stacks: HashMap<UserId, Chips>,
    pub chip_changes: HashMap<UserId, i64>,
}

/// Events the server pushes to clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    GameState(GameStateSnapshot),
    /// Authoritative resync delivered after a reconnect.
    SyncGame(GameStateSnapshot),
    DealStreet {
        game_id: TableId,
        round: Street,
        cards: Vec<Card>,
        community_cards: Vec<Card>,
    },
    HandRunout {
        game_id: TableId,
        winner_id: UserId,
        board: Vec<Card>,
    },
    TurnTimerStarted {
        game_id: TableId,
        deadline: UnixMillis,
        duration: u64,
        active_seat: SeatNumber,
    },
    PlayerStatusUpdate {
        game_id: TableId,
        player_id: UserId,
        status: PlayerStatus,
        timestamp: UnixMillis,
        action: Option<String>,
    },
    PlayerMovedToSpectator {
        game_id: TableId,
        player_id: UserId,
    },
    PlayerEliminated {
        game_id: TableId,
        player_id: UserId,
    },
    SeatVacated {
        game_id: TableId,
        seat_number: SeatNumber,
    },
    MatchFound {
        game_id: TableId,
        tournament_id: Option<TournamentId>,
    },
    QueueInfo {
        queue_type: String,
        count: usize,
        needed: usize,
        target: usize,
    },
    QueueStatus {
        queue_type: Option<String>,
        position: Option<usize>,
    },
    SessionStatus {
        in_game: bool,
        game_id: Option<TableId>,
        status: Option<String>,
    },
    ActiveStatus {
        game: Option<TableId>,
        tournament: Option<TournamentId>,
        queue: Option<String>,
    },
    GameFinished {
        game_id: TableId,
        reason: String,
        winner_id: Option<UserId>,
        timestamp: UnixMillis,
        stats: Option<GameStats>,
    },
    TableCreated {
        game_id: TableId,
        join_code: Option<String>,
    },
    JoinCodeResolved {
        game_id: TableId,
    },
    SeatRequestPending {
        game_id: TableId,
        user_id: UserId,
    },
    TournamentState(TournamentSnapshot),
    TournamentCreated {
        tournament_id: TournamentId,
    },
    TournamentStatusChanged {
        tournament_id: TournamentId,
        status: TournamentStatus,
    },
    TournamentPlayerRegistered {
        tournament_id: TournamentId,
        user_id: UserId,
    },
    TournamentPlayerUnregistered {
        tournament_id: TournamentId,
        user_id: UserId,
    },
    TournamentParticipantCountChanged {
        tournament_id: TournamentId,
        count: usize,
    },
    TournamentBlindLevelAdvanced {
        tournament_id: TournamentId,
        level: usize,
        small_blind: Chips,
        big_blind: Chips,
        level_ends_at: UnixMillis,
    },
    TournamentLevelWarning {
        tournament_id: TournamentId,
        time_remaining_ms: u64,
        current_level: usize,
    },
    TournamentPlayerEliminated {
        tournament_id: TournamentId,
        user_id: UserId,
        finish_position: usize,
    },
    TournamentPlayerTransferred {
        tournament_id: TournamentId,
        user_id: UserId,
        source_table_id: TableId,
        target_table_id: TableId,
        target_seat: SeatNumber,
    },
    TournamentTablesBalanced {
        tournament_id: TournamentId,
        table_sizes: Vec<(TableId, usize)>,
    },
    TournamentTablesMerged {
        tournament_id: TournamentId,
        closed_table_id: TableId,
    },
    TournamentCompleted {
        tournament_id: TournamentId,
        winner_id: UserId,
        results: Vec<TournamentResultEntry>,
    },
    TournamentCancelled {
        tournament_id: TournamentId,
    },
    TournamentPlayerBanned {
        tournament_id: TournamentId,
        user_id: UserId,
    },
    TournamentPlayerLeft {
        tournament_id: TournamentId,
        user_id: UserId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Short error event from anything displayable.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
