//! Per-table hand state machine.
//!
//! One `HandMachine` lives for exactly one hand: it posts blinds, deals,
//! runs the betting rounds, advances streets, and settles through the pot
//! engine. Transition methods are the only way `phase` changes. The machine
//! mutates the seat ring it is handed (players' bets, cards, chips) but
//! never touches timers or the transport; the owning table translates the
//! returned events into wire traffic.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::deck::Deck;
use super::entities::{
    Blinds, Card, Chips, HandPhase, PlayerAction, SeatNumber, UserId,
};
use super::eval::{self, HandRank};
use super::pot::{self, Contribution, Pot, PotAward};
use super::seating::SeatRing;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum HandError {
    #[error("Need 2+ players")]
    NotEnoughPlayers,
    #[error("Hand accounting invariant violated")]
    Invariant,
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ActionError {
    #[error("Out of turn")]
    OutOfTurn,
    #[error("Illegal action for phase")]
    IllegalAction,
    #[error("Insufficient chips")]
    InsufficientChips,
    #[error("Amount below minimum")]
    BelowMinimum,
    #[error("Reveal not available")]
    RevealUnavailable,
    #[error("No hand in progress")]
    NoHand,
    /// Accounting invariant broke while finishing the hand; the table
    /// contains this as a fatal error.
    #[error("Internal error")]
    Internal,
}

/// Community card rounds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Flop,
    Turn,
    River,
}

impl Street {
    #[must_use]
    pub fn card_count(self) -> usize {
        match self {
            Self::Flop => 3,
            Self::Turn | Self::River => 1,
        }
    }
}

/// What an action resolved to once validated against the stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppliedAction {
    Fold,
    Check,
    Call { amount: Chips },
    Bet { amount: Chips },
    Raise { to: Chips, reopened: bool },
    Allin { to: Chips },
}

/// Events produced by transitions, in occurrence order.
#[derive(Clone, Debug, PartialEq)]
pub enum HandEvent {
    BlindsPosted {
        sb_seat: SeatNumber,
        bb_seat: SeatNumber,
        small_posted: Chips,
        big_posted: Chips,
    },
    HoleCardsDealt {
        seats: Vec<SeatNumber>,
    },
    ActionApplied {
        seat: SeatNumber,
        action: AppliedAction,
    },
    StreetDealt {
        street: Street,
        cards: Vec<Card>,
    },
    ShowdownReached {
        reveal_order: Vec<SeatNumber>,
    },
    HandSettled(Settlement),
}

/// Final accounting of a hand.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub hand_number: u64,
    pub board: Vec<Card>,
    pub pots: Vec<Pot>,
    pub awards: Vec<PotAward>,
    pub winner_id: UserId,
    pub contributions: Vec<Contribution>,
    /// True when the hand ended because everyone else folded.
    pub fold_out: bool,
}

#[derive(Debug)]
pub struct HandMachine {
    pub hand_number: u64,
    pub phase: HandPhase,
    pub button_seat: SeatNumber,
    pub sb_seat: SeatNumber,
    pub bb_seat: SeatNumber,
    pub current_actor: Option<SeatNumber>,
    pub min_raise: Chips,
    pub high_bet: Chips,
    pub last_raise_amount: Chips,
    pub board: Vec<Card>,
    deck: Deck,
    blinds: Blinds,
    /// Seats dealt into this hand, fixed at start.
    dealt_seats: Vec<SeatNumber>,
    /// Seat of the most recent aggressor, for showdown reveal order.
    last_aggressor: Option<SeatNumber>,
    /// Seats still owing a decision this round.
    pending: BTreeSet<SeatNumber>,
    /// Seats that have acted since the last full raise.
    acted_this_round: HashSet<SeatNumber>,
    /// Seats that may call or fold but not raise (short all-in rule).
    capped: HashSet<SeatNumber>,
}

impl HandMachine {
    /// Start a hand: reset hand-scoped player state, post blinds, deal hole
    /// cards, and open the preflop round. `button_seat` must hold a
    /// dealt-in player; the table advances it before calling.
    pub fn start(
        hand_number: u64,
        button_seat: SeatNumber,
        blinds: Blinds,
        seed: u64,
        ring: &mut SeatRing,
    ) -> Result<(Self, Vec<HandEvent>), HandError> {
        use crate::game::entities::PlayerStatus;

        for player in ring.occupants_mut() {
            player.reset_for_hand();
            if player.status == PlayerStatus::WaitingForNextHand {
                player.status = PlayerStatus::Active;
            }
        }
        let dealt_seats: Vec<SeatNumber> = ring
            .seats_clockwise_of(button_seat, |p| p.is_dealt_in())
            .into_iter()
            .collect();
        if dealt_seats.len() < 2 {
            return Err(HandError::NotEnoughPlayers);
        }
        let (sb_seat, bb_seat) = ring
            .assign_positions(button_seat, |p| p.is_dealt_in())
            .ok_or(HandError::NotEnoughPlayers)?;

        let mut machine = Self {
            hand_number,
            phase: HandPhase::Preflop,
            button_seat,
            sb_seat,
            bb_seat,
            current_actor: None,
            min_raise: blinds.big,
            high_bet: blinds.big,
            last_raise_amount: blinds.big,
            board: Vec::with_capacity(5),
            deck: Deck::shuffled(seed),
            blinds,
            dealt_seats,
            last_aggressor: None,
            pending: BTreeSet::new(),
            acted_this_round: HashSet::new(),
            capped: HashSet::new(),
        };
        let mut events = Vec::new();

        // Blinds: a short stack posts what it has and is all-in; the hand
        // still begins.
        let small_posted = ring
            .get_mut(sb_seat)
            .ok_or(HandError::Invariant)?
            .contribute(machine.blinds.small);
        let big_posted = ring
            .get_mut(bb_seat)
            .ok_or(HandError::Invariant)?
            .contribute(machine.blinds.big);
        events.push(HandEvent::BlindsPosted {
            sb_seat,
            bb_seat,
            small_posted,
            big_posted,
        });

        // Two hole cards per dealt-in seat, clockwise from the small blind.
        let deal_order = machine.deal_order_from(sb_seat);
        for &seat in &deal_order {
            let cards = machine.deck.deal_hole(2);
            if let Some(player) = ring.get_mut(seat) {
                player.hole_cards = cards;
            }
        }
        events.push(HandEvent::HoleCardsDealt { seats: deal_order });

        machine.pending = machine.actable_seats(ring).into_iter().collect();
        machine.current_actor = machine.preflop_first_actor(ring);
        if machine.betting_is_moot(ring) {
            machine.pending.clear();
            machine.current_actor = None;
            machine.close_round(ring, &mut events)?;
        }
        Ok((machine, events))
    }

    /// Apply one betting action for `seat`. Returns the events the action
    /// produced, which may include street deals and full settlement.
    pub fn apply(
        &mut self,
        ring: &mut SeatRing,
        seat: SeatNumber,
        action: PlayerAction,
    ) -> Result<Vec<HandEvent>, ActionError> {
        if !matches!(
            self.phase,
            HandPhase::Preflop | HandPhase::Flop | HandPhase::Turn | HandPhase::River
        ) {
            return Err(ActionError::IllegalAction);
        }
        if self.current_actor != Some(seat) {
            return Err(ActionError::OutOfTurn);
        }

        let mut events = Vec::new();
        let applied = self.apply_validated(ring, seat, action)?;
        events.push(HandEvent::ActionApplied {
            seat,
            action: applied,
        });
        self.acted_this_round.insert(seat);
        self.pending.remove(&seat);

        // Fold-out: one unfolded player left takes everything immediately.
        let unfolded = self.unfolded_seats(ring);
        if unfolded.len() == 1 {
            self.settle_fold_out(ring, unfolded[0], &mut events)
                .map_err(|_| ActionError::Internal)?;
            return Ok(events);
        }

        if self.betting_is_moot(ring) {
            self.pending.clear();
        }
        match self.next_pending_after(ring, seat) {
            Some(next) => {
                self.current_actor = Some(next);
            }
            None => {
                self.current_actor = None;
                self.close_round(ring, &mut events)
                    .map_err(|_| ActionError::Internal)?;
            }
        }
        Ok(events)
    }

    /// Voluntarily show one hole card. Legal once the hand reached showdown
    /// (or has just settled, during the inter-hand window).
    pub fn reveal(
        &mut self,
        ring: &mut SeatRing,
        seat: SeatNumber,
        index: usize,
    ) -> Result<(), ActionError> {
        if !matches!(self.phase, HandPhase::Showdown | HandPhase::Settled) {
            return Err(ActionError::RevealUnavailable);
        }
        let player = ring.get_mut(seat).ok_or(ActionError::RevealUnavailable)?;
        if index >= player.hole_cards.len() {
            return Err(ActionError::RevealUnavailable);
        }
        if !player.revealed_indices.contains(&index) {
            player.revealed_indices.push(index);
            player.revealed_indices.sort_unstable();
        }
        Ok(())
    }

    /// The action the table submits when the turn timer fires: check when
    /// checking is free, otherwise fold.
    #[must_use]
    pub fn auto_action(&self, ring: &SeatRing, seat: SeatNumber) -> PlayerAction {
        match ring.get(seat) {
            Some(p) if p.current_bet == self.high_bet => PlayerAction::Check,
            _ => PlayerAction::Fold,
        }
    }

    /// Current pots derived from contributions so far. Recomputed on demand;
    /// `Σ amount` always equals `Σ total_bet_this_hand`.
    #[must_use]
    pub fn pots(&self, ring: &SeatRing) -> Vec<Pot> {
        pot::build_pots(&self.contributions(ring))
    }

    #[must_use]
    pub fn blinds(&self) -> Blinds {
        self.blinds
    }

    #[must_use]
    pub fn dealt_seats(&self) -> &[SeatNumber] {
        &self.dealt_seats
    }

    /// Dealt seats rotated so `start` comes first, preserving clockwise
    /// order.
    fn deal_order_from(&self, start: SeatNumber) -> Vec<SeatNumber> {
        let mut order = self.dealt_seats.clone();
        if let Some(pos) = order.iter().position(|&s| s == start) {
            order.rotate_left(pos);
        }
        order
    }

    fn contributions(&self, ring: &SeatRing) -> Vec<Contribution> {
        self.dealt_seats
            .iter()
            .filter_map(|&seat| ring.get(seat))
            .map(|p| Contribution {
                user_id: p.user_id,
                amount: p.total_bet_this_hand,
                folded: p.folded,
            })
            .collect()
    }

    fn apply_validated(
        &mut self,
        ring: &mut SeatRing,
        seat: SeatNumber,
        action: PlayerAction,
    ) -> Result<AppliedAction, ActionError> {
        let high_bet = self.high_bet;
        let full_raise_floor = self.high_bet + self.last_raise_amount;
        let capped = self.capped.contains(&seat);
        let player = ring.get_mut(seat).ok_or(ActionError::OutOfTurn)?;

        match action {
            PlayerAction::Fold => {
                player.folded = true;
                Ok(AppliedAction::Fold)
            }
            PlayerAction::Check => {
                if player.current_bet != high_bet {
                    return Err(ActionError::IllegalAction);
                }
                Ok(AppliedAction::Check)
            }
            PlayerAction::Call => {
                let owed = high_bet - player.current_bet;
                let paid = player.contribute(owed);
                Ok(AppliedAction::Call { amount: paid })
            }
            PlayerAction::Bet { amount } => {
                if high_bet != 0 || capped {
                    return Err(ActionError::IllegalAction);
                }
                if amount > player.chips {
                    return Err(ActionError::InsufficientChips);
                }
                // First voluntary bet must open for at least the big blind,
                // unless it is the whole stack.
                if amount < self.blinds.big && amount != player.chips {
                    return Err(ActionError::BelowMinimum);
                }
                player.contribute(amount);
                self.high_bet = amount;
                self.min_raise = amount;
                self.last_raise_amount = amount;
                self.reopen_action(ring, seat);
                Ok(AppliedAction::Bet { amount })
            }
            PlayerAction::Raise { amount: target } => {
                self.raise_to(ring, seat, target, high_bet, full_raise_floor, capped)
            }
            PlayerAction::Allin => {
                let target = player.current_bet + player.chips;
                if target <= high_bet {
                    // All-in for less than the call amount.
                    player.contribute(player.chips);
                    return Ok(AppliedAction::Allin { to: target });
                }
                self.raise_to(ring, seat, target, high_bet, full_raise_floor, capped)
                    .map(|applied| match applied {
                        AppliedAction::Raise { to, .. } => AppliedAction::Allin { to },
                        other => other,
                    })
            }
            PlayerAction::Reveal { .. } => Err(ActionError::IllegalAction),
        }
    }

    fn raise_to(
        &mut self,
        ring: &mut SeatRing,
        seat: SeatNumber,
        target: Chips,
        high_bet: Chips,
        full_raise_floor: Chips,
        capped: bool,
    ) -> Result<AppliedAction, ActionError> {
        let player = ring.get_mut(seat).ok_or(ActionError::OutOfTurn)?;
        if target <= high_bet {
            return Err(ActionError::BelowMinimum);
        }
        if capped {
            // Action was not reopened to this seat; it may only call or fold.
            return Err(ActionError::IllegalAction);
        }
        let delta = target - player.current_bet;
        if delta > player.chips {
            return Err(ActionError::InsufficientChips);
        }
        let is_whole_stack = delta == player.chips;
        if target < full_raise_floor && !is_whole_stack {
            return Err(ActionError::BelowMinimum);
        }
        player.contribute(delta);

        if target >= full_raise_floor {
            // Full raise: reopens action for everyone still in.
            self.last_raise_amount = target - high_bet;
            self.min_raise = self.last_raise_amount;
            self.high_bet = target;
            self.reopen_action(ring, seat);
            Ok(AppliedAction::Raise {
                to: target,
                reopened: true,
            })
        } else {
            // Short all-in: everyone must respond to the new money, but
            // seats that already acted keep no raising rights.
            self.high_bet = target;
            self.last_aggressor = Some(seat);
            let responders = self.actable_seats(ring);
            for &s in &responders {
                if s != seat {
                    self.pending.insert(s);
                    if self.acted_this_round.contains(&s) {
                        self.capped.insert(s);
                    }
                }
            }
            Ok(AppliedAction::Raise {
                to: target,
                reopened: false,
            })
        }
    }

    /// A full raise or opening bet: every other actable seat owes a fresh
    /// decision and regains raising rights.
    fn reopen_action(&mut self, ring: &SeatRing, aggressor: SeatNumber) {
        self.last_aggressor = Some(aggressor);
        self.capped.clear();
        self.acted_this_round.clear();
        self.pending = self
            .actable_seats(ring)
            .into_iter()
            .filter(|&s| s != aggressor)
            .collect();
    }

    /// Seats still able to make decisions: dealt in, unfolded, not all-in.
    fn actable_seats(&self, ring: &SeatRing) -> Vec<SeatNumber> {
        self.dealt_seats
            .iter()
            .copied()
            .filter(|&seat| ring.get(seat).is_some_and(|p| p.can_act()))
            .collect()
    }

    fn unfolded_seats(&self, ring: &SeatRing) -> Vec<SeatNumber> {
        self.dealt_seats
            .iter()
            .copied()
            .filter(|&seat| ring.get(seat).is_some_and(|p| !p.folded))
            .collect()
    }

    /// Betting is moot when at most one seat could act and that seat has
    /// nothing left to respond to (everyone else is all-in or folded).
    fn betting_is_moot(&self, ring: &SeatRing) -> bool {
        let actable = self.actable_seats(ring);
        match actable.as_slice() {
            [] => true,
            [seat] => ring
                .get(*seat)
                .is_some_and(|p| p.current_bet == self.high_bet),
            _ => false,
        }
    }

    fn next_pending_after(&self, ring: &SeatRing, seat: SeatNumber) -> Option<SeatNumber> {
        ring.next_matching(seat, |p| self.pending.contains(&p.seat))
    }

    fn preflop_first_actor(&self, ring: &SeatRing) -> Option<SeatNumber> {
        if self.dealt_seats.len() == 2 {
            // Heads-up: the button/small blind acts first preflop.
            let sb_can_act = ring.get(self.sb_seat).is_some_and(|p| p.can_act());
            if sb_can_act {
                return Some(self.sb_seat);
            }
            return ring.next_matching(self.sb_seat, |p| p.can_act());
        }
        ring.next_matching(self.bb_seat, |p| {
            p.can_act() && self.pending.contains(&p.seat)
        })
    }

    /// Close the current betting round: reset per-round state and deal the
    /// next street. When at most one player can still act, remaining
    /// streets run out back-to-back into showdown.
    fn close_round(&mut self, ring: &mut SeatRing, events: &mut Vec<HandEvent>) -> Result<(), HandError> {
        loop {
            for player in ring.occupants_mut() {
                player.current_bet = 0;
            }
            self.high_bet = 0;
            self.min_raise = self.blinds.big;
            self.last_raise_amount = self.blinds.big;
            self.pending.clear();
            self.acted_this_round.clear();
            self.capped.clear();
            self.current_actor = None;

            let street = match self.phase {
                HandPhase::Preflop => Street::Flop,
                HandPhase::Flop => Street::Turn,
                HandPhase::Turn => Street::River,
                HandPhase::River => return self.enter_showdown(ring, events),
                _ => return Err(HandError::Invariant),
            };
            self.deck.burn(1);
            let cards = self.deck.deal_board(street.card_count());
            self.board.extend_from_slice(&cards);
            self.phase = match street {
                Street::Flop => HandPhase::Flop,
                Street::Turn => HandPhase::Turn,
                Street::River => HandPhase::River,
            };
            events.push(HandEvent::StreetDealt { street, cards });

            let actable = self.actable_seats(ring);
            if actable.len() <= 1 {
                // Runout: no further betting rounds occur.
                continue;
            }
            self.pending = actable.into_iter().collect();
            self.current_actor =
                ring.next_matching(self.button_seat, |p| self.pending.contains(&p.seat));
            return Ok(());
        }
    }

    fn enter_showdown(
        &mut self,
        ring: &mut SeatRing,
        events: &mut Vec<HandEvent>,
    ) -> Result<(), HandError> {
        self.phase = HandPhase::Showdown;
        let start = self.last_aggressor.unwrap_or_else(|| {
            ring.next_matching(self.button_seat, |p| !p.folded && !p.hole_cards.is_empty())
                .unwrap_or(self.button_seat)
        });
        let mut reveal_order: Vec<SeatNumber> = Vec::new();
        if ring.get(start).is_some_and(|p| !p.folded && !p.hole_cards.is_empty()) {
            reveal_order.push(start);
        }
        reveal_order.extend(
            ring.seats_clockwise_of(start, |p| !p.folded && !p.hole_cards.is_empty())
                .into_iter()
                .filter(|&s| s != start),
        );
        // Claiming a pot requires showing: all live hands are revealed in
        // order.
        for &seat in &reveal_order {
            if let Some(player) = ring.get_mut(seat) {
                player.revealed_indices = (0..player.hole_cards.len()).collect();
            }
        }
        events.push(HandEvent::ShowdownReached {
            reveal_order: reveal_order.clone(),
        });
        self.settle(ring, events, false)
    }

    fn settle_fold_out(
        &mut self,
        ring: &mut SeatRing,
        winner_seat: SeatNumber,
        events: &mut Vec<HandEvent>,
    ) -> Result<(), HandError> {
        let winner_id = ring
            .get(winner_seat)
            .map(|p| p.user_id)
            .ok_or(HandError::Invariant)?;
        let contributions = self.contributions(ring);
        let total: Chips = contributions.iter().map(|c| c.amount).sum();
        let pots = vec![Pot {
            amount: total,
            eligible: BTreeSet::from([winner_id]),
        }];
        let awards = vec![PotAward {
            user_id: winner_id,
            amount: total,
        }];
        self.credit_and_finish(ring, events, pots, awards, winner_id, contributions, true)
    }

    fn settle(
        &mut self,
        ring: &mut SeatRing,
        events: &mut Vec<HandEvent>,
        fold_out: bool,
    ) -> Result<(), HandError> {
        let contributions = self.contributions(ring);
        let pots = pot::build_pots(&contributions);

        let mut ranks: HashMap<UserId, HandRank> = HashMap::new();
        for &seat in &self.dealt_seats {
            if let Some(player) = ring.get(seat)
                && !player.folded
            {
                ranks.insert(player.user_id, eval::rank(&player.hole_cards, &self.board));
            }
        }
        // Odd chips go one at a time starting left of the button.
        let odd_chip_order: Vec<UserId> = ring
            .seats_clockwise_of(self.button_seat, |p| !p.folded)
            .into_iter()
            .filter_map(|seat| ring.get(seat).map(|p| p.user_id))
            .collect();
        let awards = pot::settle(&pots, &ranks, &odd_chip_order);
        let winner_id = awards
            .first()
            .map(|a| a.user_id)
            .ok_or(HandError::Invariant)?;
        self.credit_and_finish(ring, events, pots, awards, winner_id, contributions, fold_out)
    }

    #[allow(clippy::too_many_arguments)]
    fn credit_and_finish(
        &mut self,
        ring: &mut SeatRing,
        events: &mut Vec<HandEvent>,
        pots: Vec<Pot>,
        awards: Vec<PotAward>,
        winner_id: UserId,
        contributions: Vec<Contribution>,
        fold_out: bool,
    ) -> Result<(), HandError> {
        let contributed: Chips = contributions.iter().map(|c| c.amount).sum();
        let potted: Chips = pots.iter().map(|p| p.amount).sum();
        let awarded: Chips = awards.iter().map(|a| a.amount).sum();
        if contributed != potted || potted != awarded {
            return Err(HandError::Invariant);
        }
        for award in &awards {
            if let Some(player) = ring.player_by_user_mut(award.user_id) {
                player.chips += award.amount;
            }
        }
        self.current_actor = None;
        self.phase = HandPhase::Settled;
        events.push(HandEvent::HandSettled(Settlement {
            hand_number: self.hand_number,
            board: self.board.clone(),
            pots,
            awards,
            winner_id,
            contributions,
            fold_out,
        }));
        Ok(())
    }
}
