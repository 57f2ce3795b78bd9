use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants;

/// Opaque, externally verified user identifier.
pub type UserId = i64;

/// Identifier of a live table.
pub type TableId = i64;

/// Identifier of a tournament.
pub type TournamentId = i64;

/// Type alias for whole chips. All bets and stacks are whole chips.
pub type Chips = u32;

/// Seat positions are 1-based; seat numbers never shift while a table lives.
pub type SeatNumber = usize;

/// Absolute epoch milliseconds as produced by the monotonic [`Clock`].
///
/// [`Clock`]: crate::clock::Clock
pub type UnixMillis = u64;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values (2u8..=14u8, ace high).
pub type Value = u8;

/// A card is a tuple of a value (deuce=2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        write!(f, "{value}{}", self.1)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
}

impl Blinds {
    #[must_use]
    pub const fn new(small: Chips, big: Chips) -> Self {
        Self { small, big }
    }
}

impl fmt::Display for Blinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.small, self.big)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantCategory {
    Cash,
    Casual,
    Tournament,
}

/// Immutable description of a game flavor. Queues, private tables, and
/// tournament tables all start from one of these.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Variant {
    pub slug: String,
    pub name: String,
    pub max_players: usize,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub starting_stack: Chips,
    pub buy_in: Chips,
    pub category: VariantCategory,
    pub turn_timeout_millis: u64,
    pub disconnect_grace_millis: u64,
    /// Queue size at which the matchmaker mints a table.
    pub queue_target: usize,
}

impl Variant {
    /// Standard heads-up cash variant: pairs every two queued users.
    #[must_use]
    pub fn heads_up() -> Self {
        Self {
            slug: "heads_up".to_string(),
            name: "Heads-Up".to_string(),
            max_players: 2,
            small_blind: 1,
            big_blind: 2,
            starting_stack: 200,
            buy_in: constants::DEFAULT_BUY_IN,
            category: VariantCategory::Cash,
            turn_timeout_millis: constants::DEFAULT_TURN_TIMEOUT_MILLIS,
            disconnect_grace_millis: constants::DEFAULT_DISCONNECT_GRACE_MILLIS,
            queue_target: 2,
        }
    }

    /// Standard six-handed cash variant.
    #[must_use]
    pub fn six_max() -> Self {
        Self {
            slug: "six_max".to_string(),
            name: "6-Max".to_string(),
            max_players: 6,
            small_blind: 5,
            big_blind: 10,
            starting_stack: 1_000,
            buy_in: constants::DEFAULT_BUY_IN,
            category: VariantCategory::Cash,
            turn_timeout_millis: constants::DEFAULT_TURN_TIMEOUT_MILLIS,
            disconnect_grace_millis: constants::DEFAULT_DISCONNECT_GRACE_MILLIS,
            queue_target: 6,
        }
    }

    pub fn blinds(&self) -> Blinds {
        Blinds::new(self.small_blind, self.big_blind)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(2..=constants::MAX_PLAYERS).contains(&self.max_players) {
            return Err("Invalid player count".to_string());
        }
        if self.big_blind <= self.small_blind || self.small_blind == 0 {
            return Err("Invalid blinds".to_string());
        }
        if self.starting_stack < self.big_blind {
            return Err("Starting stack below big blind".to_string());
        }
        if self.queue_target < 2 || self.queue_target > self.max_players {
            return Err("Invalid queue target".to_string());
        }
        Ok(())
    }
}

/// Seat lifecycle for a player occupying a seat.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Active,
    WaitingForNextHand,
    Disconnected,
    Left,
    Removed,
    Eliminated,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Active => "active",
            Self::WaitingForNextHand => "waiting_for_next_hand",
            Self::Disconnected => "disconnected",
            Self::Left => "left",
            Self::Removed => "removed",
            Self::Eliminated => "eliminated",
        };
        write!(f, "{repr}")
    }
}

/// A player occupying a seat at a table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Player {
    pub user_id: UserId,
    pub seat: SeatNumber,
    pub chips: Chips,
    /// Amount committed this betting round.
    pub current_bet: Chips,
    /// Amount committed across the whole hand; drives pot construction.
    pub total_bet_this_hand: Chips,
    pub hole_cards: Vec<Card>,
    pub folded: bool,
    pub all_in: bool,
    /// Set when the seat will be vacated at the next hand boundary.
    pub leaving: bool,
    pub status: PlayerStatus,
    /// Indices into `hole_cards` the player has chosen to show.
    pub revealed_indices: Vec<usize>,
    pub disconnect_deadline: Option<UnixMillis>,
}

impl Player {
    #[must_use]
    pub fn new(user_id: UserId, seat: SeatNumber, chips: Chips) -> Self {
        Self {
            user_id,
            seat,
            chips,
            current_bet: 0,
            total_bet_this_hand: 0,
            hole_cards: Vec::with_capacity(2),
            folded: false,
            all_in: false,
            leaving: false,
            status: PlayerStatus::WaitingForNextHand,
            revealed_indices: Vec::new(),
            disconnect_deadline: None,
        }
    }

    /// Clear all hand-scoped state. Seat, chips, and presence survive.
    pub fn reset_for_hand(&mut self) {
        self.current_bet = 0;
        self.total_bet_this_hand = 0;
        self.hole_cards.clear();
        self.folded = false;
        self.all_in = false;
        self.revealed_indices.clear();
    }

    /// Move `amount` (clamped to the stack) from chips into the bet fields.
    /// Returns what was actually contributed.
    pub fn contribute(&mut self, amount: Chips) -> Chips {
        let paid = amount.min(self.chips);
        self.chips -= paid;
        self.current_bet += paid;
        self.total_bet_this_hand += paid;
        if self.chips == 0 {
            self.all_in = true;
        }
        paid
    }

    /// Whether the player is dealt into hands (ghosts count as present).
    #[must_use]
    pub fn is_dealt_in(&self) -> bool {
        matches!(
            self.status,
            PlayerStatus::Active | PlayerStatus::Disconnected | PlayerStatus::WaitingForNextHand
        ) && self.chips > 0
    }

    /// Whether the player still has a decision to make this hand.
    #[must_use]
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in && !self.hole_cards.is_empty()
    }
}

/// Betting phases of a hand. Transition methods on the hand machine are the
/// only way a hand moves between these.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandPhase {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Settled,
}

impl fmt::Display for HandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
            Self::Settled => "settled",
        };
        write!(f, "{repr}")
    }
}

/// One action a seated player may submit on their turn (plus `reveal`,
/// which is legal only at showdown).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Bet { amount: Chips },
    /// Raise *to* `amount`, not by.
    Raise { amount: Chips },
    Allin,
    Reveal { index: usize },
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "folds".to_string(),
            Self::Check => "checks".to_string(),
            Self::Call => "calls".to_string(),
            Self::Bet { amount } => format!("bets {amount}"),
            Self::Raise { amount } => format!("raises to {amount}"),
            Self::Allin => "goes all-in".to_string(),
            Self::Reveal { index } => format!("shows card {index}"),
        };
        write!(f, "{repr}")
    }
}
