//! Table actor message types and errors.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::game::entities::{Blinds, Chips, PlayerAction, SeatNumber, TableId, UserId};
use crate::game::hand::ActionError;
use crate::game::seating::SeatError;
use crate::net::messages::{AdminCommand, GameStateSnapshot};

/// Errors surfaced to the originating socket as `error` events. Messages
/// are short phrases; none of them mutate state.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TableError {
    #[error("Not a player in this game")]
    NotAPlayer,
    #[error("Out of turn")]
    OutOfTurn,
    #[error("Insufficient chips")]
    InsufficientChips,
    #[error("Amount below minimum")]
    BelowMinimum,
    #[error("Illegal action for phase")]
    IllegalAction,
    #[error("Reveal not available")]
    RevealUnavailable,
    #[error("Host only")]
    HostOnly,
    #[error("Need 2+ players")]
    NotEnoughPlayers,
    #[error("Invalid blinds")]
    InvalidBlinds,
    #[error("No pending seat request")]
    NoSeatRequest,
    #[error("Player is in a hand")]
    PlayerInHand,
    #[error("Game is over")]
    GameOver,
    #[error("{0}")]
    Seat(#[from] SeatError),
}

impl From<ActionError> for TableError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::OutOfTurn => Self::OutOfTurn,
            ActionError::InsufficientChips => Self::InsufficientChips,
            ActionError::BelowMinimum => Self::BelowMinimum,
            ActionError::RevealUnavailable => Self::RevealUnavailable,
            ActionError::IllegalAction | ActionError::NoHand | ActionError::Internal => {
                Self::IllegalAction
            }
        }
    }
}

/// Successful `join_game` payload.
#[derive(Clone, Debug)]
pub struct JoinOutcome {
    pub snapshot: GameStateSnapshot,
    /// True when the join reconnected a disconnected seat; the router
    /// follows up with `sync_game`.
    pub resumed: bool,
}

/// Settlement summary pushed to the tournament supervisor after each hand.
#[derive(Clone, Debug)]
pub struct TableSettlement {
    pub table_id: TableId,
    /// Post-settlement stacks of every player dealt into the hand.
    pub stacks: Vec<(UserId, Chips)>,
    /// Players who finished the hand with zero chips while all-in.
    pub busted: Vec<UserId>,
}

/// Messages a table actor processes serially from its mailbox.
#[derive(Debug)]
pub enum TableMessage {
    /// Subscribe semantics are handled by the router; the actor reconciles
    /// presence and returns an authoritative snapshot.
    Join {
        user_id: UserId,
        response: oneshot::Sender<Result<JoinOutcome, TableError>>,
    },

    /// Personalized snapshot without side effects.
    Snapshot {
        viewer: Option<UserId>,
        response: oneshot::Sender<GameStateSnapshot>,
    },

    /// Take a seat. Used by the matchmaker when minting, by hosts
    /// self-seating, and by the tournament supervisor for transfers.
    SitDown {
        user_id: UserId,
        seat: Option<SeatNumber>,
        chips: Option<Chips>,
        response: oneshot::Sender<Result<SeatNumber, TableError>>,
    },

    Leave {
        user_id: UserId,
        response: oneshot::Sender<Result<(), TableError>>,
    },

    /// Betting action or showdown reveal.
    Act {
        user_id: UserId,
        seat: SeatNumber,
        action: PlayerAction,
        response: oneshot::Sender<Result<(), TableError>>,
    },

    /// Non-seated user asks the host for a seat (private tables).
    RequestSeat {
        user_id: UserId,
        response: oneshot::Sender<Result<(), TableError>>,
    },

    /// Host-only administration.
    Admin {
        user_id: UserId,
        action: AdminCommand,
        response: oneshot::Sender<Result<(), TableError>>,
    },

    /// Connection registry presence transition for a user.
    PresenceChanged { user_id: UserId, online: bool },

    /// Remove a seated player between hands and return their stack
    /// (tournament balancing and merging).
    RemoveForTransfer {
        user_id: UserId,
        response: oneshot::Sender<Result<Chips, TableError>>,
    },

    /// Flag a player as having left (tournament ban): auto-folded on turn,
    /// seat vacated at the next hand boundary.
    MarkLeft { user_id: UserId },

    /// New blinds effective at the next hand (tournament blind clock).
    SetBlinds { blinds: Blinds },

    /// Pause state synchronized from the owning tournament.
    SetPaused { paused: bool },

    /// Attempt to start the next hand now (matchmaker mint, host start).
    StartHand,

    /// Close the table.
    Close { reason: String },

    /// Turn timer fired.
    TurnTimeout { generation: u64 },

    /// Disconnect grace window elapsed for a user.
    GraceExpired { user_id: UserId, generation: u64 },

    /// Inter-hand delay elapsed; try to start the next hand.
    InterHandTimer { generation: u64 },
}

/// Cloneable handle for sending messages to a table actor.
#[derive(Clone)]
pub struct TableHandle {
    sender: tokio::sync::mpsc::UnboundedSender<TableMessage>,
    table_id: TableId,
}

impl TableHandle {
    #[must_use]
    pub fn new(
        sender: tokio::sync::mpsc::UnboundedSender<TableMessage>,
        table_id: TableId,
    ) -> Self {
        Self { sender, table_id }
    }

    #[must_use]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Fire-and-forget send. Errors mean the table is closed.
    pub fn send(&self, message: TableMessage) -> Result<(), TableError> {
        self.sender.send(message).map_err(|_| TableError::GameOver)
    }

    async fn request<T>(
        &self,
        message: TableMessage,
        rx: oneshot::Receiver<Result<T, TableError>>,
    ) -> Result<T, TableError> {
        self.send(message)?;
        rx.await.map_err(|_| TableError::GameOver)?
    }

    pub async fn join(&self, user_id: UserId) -> Result<JoinOutcome, TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::Join {
                user_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn snapshot(&self, viewer: Option<UserId>) -> Result<GameStateSnapshot, TableError> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::Snapshot {
            viewer,
            response: tx,
        })?;
        rx.await.map_err(|_| TableError::GameOver)
    }

    pub async fn sit_down(
        &self,
        user_id: UserId,
        seat: Option<SeatNumber>,
        chips: Option<Chips>,
    ) -> Result<SeatNumber, TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::SitDown {
                user_id,
                seat,
                chips,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<(), TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::Leave {
                user_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn act(
        &self,
        user_id: UserId,
        seat: SeatNumber,
        action: PlayerAction,
    ) -> Result<(), TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::Act {
                user_id,
                seat,
                action,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn request_seat(&self, user_id: UserId) -> Result<(), TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::RequestSeat {
                user_id,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn admin(&self, user_id: UserId, action: AdminCommand) -> Result<(), TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::Admin {
                user_id,
                action,
                response: tx,
            },
            rx,
        )
        .await
    }

    pub async fn remove_for_transfer(&self, user_id: UserId) -> Result<Chips, TableError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            TableMessage::RemoveForTransfer {
                user_id,
                response: tx,
            },
            rx,
        )
        .await
    }
}
