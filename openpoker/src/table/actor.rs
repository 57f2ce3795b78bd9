//! Table actor: the single writer for one table's state.
//!
//! Commands, timer callbacks, and presence transitions all arrive through
//! one mailbox and are processed serially in FIFO order, so no table state
//! is ever observed torn. The only suspension inside a table is a timer
//! callback re-entering the mailbox; hand-history persistence is handed to
//! a background task after settlement and can never block the next hand.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::config::TableConfig;
use super::messages::{JoinOutcome, TableError, TableHandle, TableMessage, TableSettlement};
use crate::broadcast::Broadcaster;
use crate::clock::{Clock, TimerId};
use crate::connection::ConnectionRegistry;
use crate::constants::{INTER_HAND_DELAY_MILLIS, MIN_PLAYERS_TO_DEAL};
use crate::game::entities::{
    Blinds, Chips, HandPhase, Player, PlayerAction, PlayerStatus, SeatNumber, TableId, UserId,
};
use crate::game::hand::{ActionError, HandEvent, HandMachine, Settlement};
use crate::game::seating::SeatRing;
use crate::history::{HandHistorySink, HandRecord, HandSeatRecord};
use crate::net::messages::{
    AdminCommand, GameStateSnapshot, GameStats, PlayerSnapshot, PotSnapshot, ServerEvent,
};
use crate::sessions::ActiveSessions;

/// Shared collaborators every table needs.
#[derive(Clone)]
pub struct TableDeps {
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<Broadcaster>,
    pub registry: Arc<ConnectionRegistry>,
    pub sessions: Arc<ActiveSessions>,
    pub history: Arc<dyn HandHistorySink>,
}

pub struct TableActor {
    id: TableId,
    config: TableConfig,
    deps: TableDeps,
    inbox: mpsc::UnboundedReceiver<TableMessage>,
    handle: TableHandle,

    seats: SeatRing,
    hand: Option<HandMachine>,
    hand_number: u64,
    hands_played: u64,
    prev_button: Option<SeatNumber>,
    is_paused: bool,
    is_closed: bool,

    /// Blinds for the next hand; starts from the variant, replaced by
    /// host or tournament updates at hand boundaries.
    blinds: Blinds,
    pending_blinds: Option<Blinds>,
    pending_stack_sets: Vec<(UserId, Chips)>,
    pending_seat_requests: Vec<UserId>,
    spectators: std::collections::HashSet<UserId>,

    turn_generation: u64,
    turn_timer: Option<TimerId>,
    /// Identity of the currently timed turn, to reschedule only on actor
    /// changes.
    timed_turn: Option<(u64, HandPhase, SeatNumber)>,
    interhand_generation: u64,
    interhand_timer: Option<TimerId>,
    grace_timers: HashMap<UserId, (TimerId, u64)>,
    grace_generation: u64,

    starting_stacks: HashMap<UserId, Chips>,
    departed_stacks: HashMap<UserId, Chips>,

    /// Settlement hook for the owning tournament.
    settlement_tx: Option<mpsc::UnboundedSender<TableSettlement>>,
    /// Table ids of closed tables are pushed here for directory cleanup.
    closed_tx: Option<mpsc::UnboundedSender<TableId>>,
}

impl TableActor {
    pub fn new(
        id: TableId,
        config: TableConfig,
        deps: TableDeps,
        settlement_tx: Option<mpsc::UnboundedSender<TableSettlement>>,
        closed_tx: Option<mpsc::UnboundedSender<TableId>>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let handle = TableHandle::new(sender, id);
        let seats = SeatRing::new(config.variant.max_players);
        let blinds = config.variant.blinds();
        let paused = config.tournament_id.is_some();
        let actor = Self {
            id,
            config,
            deps,
            inbox,
            handle: handle.clone(),
            seats,
            hand: None,
            hand_number: 0,
            hands_played: 0,
            prev_button: None,
            is_paused: paused,
            is_closed: false,
            blinds,
            pending_blinds: None,
            pending_stack_sets: Vec::new(),
            pending_seat_requests: Vec::new(),
            spectators: std::collections::HashSet::new(),
            turn_generation: 0,
            turn_timer: None,
            timed_turn: None,
            interhand_generation: 0,
            interhand_timer: None,
            grace_timers: HashMap::new(),
            grace_generation: 0,
            starting_stacks: HashMap::new(),
            departed_stacks: HashMap::new(),
            settlement_tx,
            closed_tx,
        };
        (actor, handle)
    }

    /// Run the mailbox loop until the table closes.
    pub async fn run(mut self) {
        log::info!("table {} ({}) starting", self.id, self.config.variant.slug);
        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message);
            if self.is_closed {
                break;
            }
        }
        self.cancel_timers();
        if let Some(closed_tx) = &self.closed_tx {
            let _ = closed_tx.send(self.id);
        }
        log::info!("table {} closed", self.id);
    }

    fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join { user_id, response } => {
                let _ = response.send(self.handle_join(user_id));
            }
            TableMessage::Snapshot { viewer, response } => {
                let _ = response.send(self.snapshot_for(viewer));
            }
            TableMessage::SitDown {
                user_id,
                seat,
                chips,
                response,
            } => {
                let _ = response.send(self.handle_sit_down(user_id, seat, chips));
            }
            TableMessage::Leave { user_id, response } => {
                let _ = response.send(self.handle_leave(user_id));
            }
            TableMessage::Act {
                user_id,
                seat,
                action,
                response,
            } => {
                let _ = response.send(self.handle_act(user_id, seat, action));
            }
            TableMessage::RequestSeat { user_id, response } => {
                let _ = response.send(self.handle_request_seat(user_id));
            }
            TableMessage::Admin {
                user_id,
                action,
                response,
            } => {
                let _ = response.send(self.handle_admin(user_id, action));
            }
            TableMessage::PresenceChanged { user_id, online } => {
                self.handle_presence(user_id, online);
            }
            TableMessage::RemoveForTransfer { user_id, response } => {
                let _ = response.send(self.handle_remove_for_transfer(user_id));
            }
            TableMessage::MarkLeft { user_id } => {
                self.mark_departing(user_id, PlayerStatus::Left);
            }
            TableMessage::SetBlinds { blinds } => {
                self.pending_blinds = Some(blinds);
            }
            TableMessage::SetPaused { paused } => {
                self.set_paused(paused);
            }
            TableMessage::StartHand => {
                if !self.hand_in_progress() {
                    self.try_start_hand();
                }
            }
            TableMessage::Close { reason } => {
                self.close_table(&reason, None, false);
            }
            TableMessage::TurnTimeout { generation } => {
                self.handle_turn_timeout(generation);
            }
            TableMessage::GraceExpired {
                user_id,
                generation,
            } => {
                self.handle_grace_expired(user_id, generation);
            }
            TableMessage::InterHandTimer { generation } => {
                if generation == self.interhand_generation {
                    self.interhand_timer = None;
                    self.try_start_hand();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Command handlers
    // ------------------------------------------------------------------

    fn handle_join(&mut self, user_id: UserId) -> Result<JoinOutcome, TableError> {
        if self.is_closed {
            return Err(TableError::GameOver);
        }
        let mut resumed = false;
        if let Some(player) = self.seats.player_by_user_mut(user_id) {
            if player.status == PlayerStatus::Disconnected {
                player.status = PlayerStatus::Active;
                player.disconnect_deadline = None;
                resumed = true;
            }
        } else {
            self.spectators.insert(user_id);
        }
        if resumed {
            self.cancel_grace_timer(user_id);
            self.emit_status_update(user_id, PlayerStatus::Active, None);
        }
        Ok(JoinOutcome {
            snapshot: self.snapshot_for(Some(user_id)),
            resumed,
        })
    }

    fn handle_sit_down(
        &mut self,
        user_id: UserId,
        seat: Option<SeatNumber>,
        chips: Option<Chips>,
    ) -> Result<SeatNumber, TableError> {
        if self.is_closed {
            return Err(TableError::GameOver);
        }
        // On private tables, direct seating is reserved for the host;
        // everyone else goes through the seat-request queue.
        if self.config.is_private() && self.config.host_id != Some(user_id) {
            return Err(TableError::HostOnly);
        }
        self.seat_user(user_id, seat, chips)
    }

    fn seat_user(
        &mut self,
        user_id: UserId,
        seat: Option<SeatNumber>,
        chips: Option<Chips>,
    ) -> Result<SeatNumber, TableError> {
        let seat = match seat {
            Some(seat) => seat,
            None => self
                .seats
                .first_open_seat()
                .ok_or(TableError::Seat(crate::game::seating::SeatError::TableFull))?,
        };
        let stack = chips.unwrap_or(self.config.variant.starting_stack);
        let mut player = Player::new(user_id, seat, stack);
        player.status = PlayerStatus::WaitingForNextHand;
        self.seats.seat(player, seat)?;
        self.spectators.remove(&user_id);
        self.starting_stacks.entry(user_id).or_insert(stack);
        self.deps.sessions.set_game(user_id, Some(self.id));
        log::info!("user {user_id} seated at table {} seat {seat}", self.id);
        self.after_state_change();
        if self.config.auto_start {
            self.try_start_hand();
        }
        Ok(seat)
    }

    fn handle_leave(&mut self, user_id: UserId) -> Result<(), TableError> {
        if self.spectators.remove(&user_id) {
            return Ok(());
        }
        if self.seats.player_by_user(user_id).is_none() {
            return Err(TableError::NotAPlayer);
        }
        self.mark_departing(user_id, PlayerStatus::Left);
        Ok(())
    }

    /// Flag a seated player as departing. They are auto-folded when action
    /// reaches them and their seat is vacated at the next hand boundary;
    /// outside a hand the seat is vacated immediately.
    fn mark_departing(&mut self, user_id: UserId, status: PlayerStatus) {
        let Some(player) = self.seats.player_by_user_mut(user_id) else {
            return;
        };
        player.status = status;
        player.leaving = true;
        player.disconnect_deadline = None;
        self.cancel_grace_timer(user_id);
        self.emit_status_update(user_id, status, None);
        if self.hand_in_progress() {
            // Fold them as soon as action reaches them.
            self.pump(Vec::new());
        } else {
            self.vacate_departing();
            self.after_state_change();
            self.maybe_finish_cash_game();
        }
    }

    fn handle_act(
        &mut self,
        user_id: UserId,
        seat: SeatNumber,
        action: PlayerAction,
    ) -> Result<(), TableError> {
        if self.is_closed {
            return Err(TableError::GameOver);
        }
        let player = self
            .seats
            .player_by_user(user_id)
            .ok_or(TableError::NotAPlayer)?;
        if player.seat != seat {
            return Err(TableError::NotAPlayer);
        }
        let hand = self.hand.as_mut().ok_or(TableError::IllegalAction)?;
        if let PlayerAction::Reveal { index } = action {
            hand.reveal(&mut self.seats, seat, index)
                .map_err(TableError::from)?;
            self.after_state_change();
            return Ok(());
        }
        match hand.apply(&mut self.seats, seat, action) {
            Ok(events) => {
                self.pump(events);
                Ok(())
            }
            Err(ActionError::Internal) => {
                self.abort_hand();
                Err(TableError::IllegalAction)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn handle_request_seat(&mut self, user_id: UserId) -> Result<(), TableError> {
        if !self.config.is_private() {
            return Err(TableError::IllegalAction);
        }
        if self.seats.player_by_user(user_id).is_some() {
            return Err(TableError::Seat(
                crate::game::seating::SeatError::AlreadySeated,
            ));
        }
        if !self.pending_seat_requests.contains(&user_id) {
            self.pending_seat_requests.push(user_id);
        }
        if let Some(host) = self.config.host_id {
            self.deps.registry.send_to_user(
                host,
                &ServerEvent::SeatRequestPending {
                    game_id: self.id,
                    user_id,
                },
            );
        }
        Ok(())
    }

    fn handle_admin(&mut self, user_id: UserId, action: AdminCommand) -> Result<(), TableError> {
        if self.config.host_id != Some(user_id) {
            return Err(TableError::HostOnly);
        }
        match action {
            AdminCommand::Pause => {
                self.set_paused(true);
                Ok(())
            }
            AdminCommand::Resume => {
                self.set_paused(false);
                Ok(())
            }
            AdminCommand::StartGame => {
                if self.seats.occupied_count() < MIN_PLAYERS_TO_DEAL {
                    return Err(TableError::NotEnoughPlayers);
                }
                if self.hand_in_progress() {
                    return Err(TableError::IllegalAction);
                }
                self.try_start_hand();
                Ok(())
            }
            AdminCommand::Kick { user_id: target } => {
                if self.seats.player_by_user(target).is_none() {
                    return Err(TableError::NotAPlayer);
                }
                self.mark_departing(target, PlayerStatus::Removed);
                Ok(())
            }
            AdminCommand::Approve {
                user_id: target,
                chips,
            } => {
                let position = self
                    .pending_seat_requests
                    .iter()
                    .position(|&u| u == target)
                    .ok_or(TableError::NoSeatRequest)?;
                self.pending_seat_requests.remove(position);
                if let Err(err) = self.seat_user(target, None, chips) {
                    self.pending_seat_requests.insert(position, target);
                    return Err(err);
                }
                Ok(())
            }
            AdminCommand::Reject { user_id: target } => {
                let position = self
                    .pending_seat_requests
                    .iter()
                    .position(|&u| u == target)
                    .ok_or(TableError::NoSeatRequest)?;
                self.pending_seat_requests.remove(position);
                self.deps
                    .registry
                    .send_to_user(target, &ServerEvent::error("Seat request rejected"));
                Ok(())
            }
            AdminCommand::SetStack {
                user_id: target,
                chips,
            } => {
                let in_hand = !self
                    .seats
                    .player_by_user(target)
                    .ok_or(TableError::NotAPlayer)?
                    .hole_cards
                    .is_empty()
                    && self.hand_in_progress();
                if in_hand {
                    // Deferred to the hand boundary.
                    self.pending_stack_sets.push((target, chips));
                } else {
                    if let Some(player) = self.seats.player_by_user_mut(target) {
                        player.chips = chips;
                        player.all_in = false;
                    }
                    self.after_state_change();
                }
                Ok(())
            }
            AdminCommand::SetBlinds { small, big } => {
                if small == 0 || big <= small {
                    return Err(TableError::InvalidBlinds);
                }
                self.pending_blinds = Some(Blinds::new(small, big));
                Ok(())
            }
        }
    }

    fn handle_presence(&mut self, user_id: UserId, online: bool) {
        let Some(player) = self.seats.player_by_user_mut(user_id) else {
            if !online {
                self.spectators.remove(&user_id);
            }
            return;
        };
        if online {
            if player.status == PlayerStatus::Disconnected {
                player.status = PlayerStatus::Active;
                player.disconnect_deadline = None;
                self.cancel_grace_timer(user_id);
                self.emit_status_update(user_id, PlayerStatus::Active, None);
                let snapshot = self.snapshot_for(Some(user_id));
                self.deps
                    .registry
                    .send_to_user(user_id, &ServerEvent::SyncGame(snapshot));
            }
            return;
        }
        if player.status != PlayerStatus::Active
            && player.status != PlayerStatus::WaitingForNextHand
        {
            return;
        }
        let deadline = self.deps.clock.now_millis() + self.config.variant.disconnect_grace_millis;
        player.status = PlayerStatus::Disconnected;
        player.disconnect_deadline = Some(deadline);
        self.emit_status_update(user_id, PlayerStatus::Disconnected, None);
        self.grace_generation += 1;
        let generation = self.grace_generation;
        let handle = self.handle.clone();
        let timer = self.deps.clock.schedule_at(
            deadline,
            Box::new(move || {
                let _ = handle.send(TableMessage::GraceExpired {
                    user_id,
                    generation,
                });
            }),
        );
        self.grace_timers.insert(user_id, (timer, generation));
    }

    fn handle_grace_expired(&mut self, user_id: UserId, generation: u64) {
        match self.grace_timers.get(&user_id) {
            Some((_, live)) if *live == generation => {}
            _ => return,
        }
        self.grace_timers.remove(&user_id);
        let still_disconnected = self
            .seats
            .player_by_user(user_id)
            .is_some_and(|p| p.status == PlayerStatus::Disconnected);
        if still_disconnected {
            log::info!("user {user_id} grace elapsed on table {}", self.id);
            self.mark_departing(user_id, PlayerStatus::Left);
        }
    }

    fn handle_remove_for_transfer(&mut self, user_id: UserId) -> Result<Chips, TableError> {
        let player = self
            .seats
            .player_by_user(user_id)
            .ok_or(TableError::NotAPlayer)?;
        if self.hand_in_progress() && !player.hole_cards.is_empty() {
            return Err(TableError::PlayerInHand);
        }
        let seat = player.seat;
        let player = self.seats.vacate(seat).ok_or(TableError::NotAPlayer)?;
        self.broadcast(&ServerEvent::SeatVacated {
            game_id: self.id,
            seat_number: seat,
        });
        self.after_state_change();
        Ok(player.chips)
    }

    fn handle_turn_timeout(&mut self, generation: u64) {
        if generation != self.turn_generation || self.is_closed {
            return;
        }
        self.turn_timer = None;
        let Some(hand) = self.hand.as_ref() else {
            return;
        };
        let Some(seat) = hand.current_actor else {
            return;
        };
        // Ghosts fold on timeout; connected players check when it is free.
        let disconnected = self
            .seats
            .get(seat)
            .is_some_and(|p| p.status == PlayerStatus::Disconnected);
        let action = if disconnected {
            PlayerAction::Fold
        } else {
            hand.auto_action(&self.seats, seat)
        };
        log::debug!(
            "table {}: seat {seat} timed out, auto {action}",
            self.id
        );
        self.apply_machine_action(seat, action);
    }

    fn set_paused(&mut self, paused: bool) {
        if self.is_paused == paused {
            return;
        }
        self.is_paused = paused;
        log::info!("table {} paused={paused}", self.id);
        if !paused && !self.hand_in_progress() {
            self.try_start_hand();
        }
        self.after_state_change();
    }

    // ------------------------------------------------------------------
    // Hand lifecycle
    // ------------------------------------------------------------------

    fn hand_in_progress(&self) -> bool {
        self.hand
            .as_ref()
            .is_some_and(|h| h.phase != HandPhase::Settled)
    }

    /// Apply a machine action on behalf of a seat (auto-actions).
    fn apply_machine_action(&mut self, seat: SeatNumber, action: PlayerAction) {
        let Some(hand) = self.hand.as_mut() else {
            return;
        };
        match hand.apply(&mut self.seats, seat, action) {
            Ok(events) => self.pump(events),
            Err(ActionError::Internal) => self.abort_hand(),
            Err(err) => {
                log::warn!("table {}: auto action failed: {err}", self.id);
            }
        }
    }

    /// Translate machine events into wire traffic, fold departing actors,
    /// and settle the timer/snapshot bookkeeping.
    fn pump(&mut self, events: Vec<HandEvent>) {
        let mut queue = events;
        loop {
            for event in queue.drain(..) {
                self.emit_hand_event(event);
            }
            // Players flagged Left or Removed fold the moment action
            // reaches them; ghosts wait for the turn timer.
            let departing_actor = self.hand.as_ref().and_then(|h| h.current_actor).filter(|&seat| {
                self.seats.get(seat).is_some_and(|p| {
                    matches!(p.status, PlayerStatus::Left | PlayerStatus::Removed)
                })
            });
            let Some(seat) = departing_actor else { break };
            let Some(hand) = self.hand.as_mut() else { break };
            match hand.apply(&mut self.seats, seat, PlayerAction::Fold) {
                Ok(more) => queue = more,
                Err(ActionError::Internal) => {
                    self.abort_hand();
                    return;
                }
                Err(err) => {
                    log::warn!("table {}: departing fold failed: {err}", self.id);
                    break;
                }
            }
        }
        self.after_state_change();
    }

    fn emit_hand_event(&mut self, event: HandEvent) {
        match event {
            HandEvent::BlindsPosted {
                sb_seat, bb_seat, ..
            } => {
                log::debug!(
                    "table {} hand {}: blinds posted (sb {sb_seat}, bb {bb_seat})",
                    self.id,
                    self.hand_number
                );
            }
            HandEvent::HoleCardsDealt { .. } | HandEvent::ActionApplied { .. } => {}
            HandEvent::StreetDealt { street, cards } => {
                let community = self
                    .hand
                    .as_ref()
                    .map(|h| h.board.clone())
                    .unwrap_or_default();
                self.broadcast(&ServerEvent::DealStreet {
                    game_id: self.id,
                    round: street,
                    cards,
                    community_cards: community,
                });
            }
            HandEvent::ShowdownReached { .. } => {}
            HandEvent::HandSettled(settlement) => self.on_settled(settlement),
        }
    }

    fn on_settled(&mut self, settlement: Settlement) {
        self.hands_played += 1;
        self.prev_button = self.hand.as_ref().map(|h| h.button_seat);
        self.broadcast(&ServerEvent::HandRunout {
            game_id: self.id,
            winner_id: settlement.winner_id,
            board: settlement.board.clone(),
        });

        // Busted all-in players are out of the game.
        let mut busted = Vec::new();
        let mut stacks = Vec::new();
        for contribution in &settlement.contributions {
            if let Some(player) = self.seats.player_by_user_mut(contribution.user_id) {
                stacks.push((player.user_id, player.chips));
                if player.chips == 0 && player.all_in {
                    busted.push(player.user_id);
                    player.status = PlayerStatus::Eliminated;
                    player.leaving = true;
                }
            }
        }
        for &user_id in &busted {
            self.broadcast(&ServerEvent::PlayerEliminated {
                game_id: self.id,
                player_id: user_id,
            });
        }

        self.record_history(&settlement);
        if let Some(tx) = &self.settlement_tx {
            let _ = tx.send(TableSettlement {
                table_id: self.id,
                stacks,
                busted,
            });
        }
        // Settlement is the hand boundary: departing and busted seats free
        // up now, so tournament balancing can refill them immediately.
        self.vacate_departing();

        // Short inter-hand delay, then attempt the next hand.
        self.interhand_generation += 1;
        let generation = self.interhand_generation;
        let handle = self.handle.clone();
        if let Some(timer) = self.interhand_timer.take() {
            self.deps.clock.cancel(timer);
        }
        self.interhand_timer = Some(self.deps.clock.schedule_at(
            self.deps.clock.now_millis() + INTER_HAND_DELAY_MILLIS,
            Box::new(move || {
                let _ = handle.send(TableMessage::InterHandTimer { generation });
            }),
        ));
    }

    fn record_history(&self, settlement: &Settlement) {
        let dealt = self
            .hand
            .as_ref()
            .map(|h| h.dealt_seats().to_vec())
            .unwrap_or_default();
        let seats: Vec<HandSeatRecord> = dealt
            .iter()
            .enumerate()
            .filter_map(|(manifest_index, &seat)| {
                let player = self.seats.get(seat)?;
                let contribution = settlement
                    .contributions
                    .iter()
                    .find(|c| c.user_id == player.user_id);
                let won = settlement
                    .awards
                    .iter()
                    .find(|a| a.user_id == player.user_id)
                    .map_or(0, |a| a.amount);
                Some(HandSeatRecord {
                    manifest_index,
                    user_id: player.user_id,
                    seat,
                    hole_cards: player.hole_cards.clone(),
                    contributed: contribution.map_or(0, |c| c.amount),
                    folded: player.folded,
                    won,
                })
            })
            .collect();
        let record = HandRecord {
            id: Uuid::new_v4(),
            table_id: self.id,
            tournament_id: self.config.tournament_id,
            hand_number: settlement.hand_number,
            board: settlement.board.clone(),
            seats,
            pots: settlement.pots.clone(),
            awards: settlement.awards.clone(),
            winner_id: settlement.winner_id,
            completed_at: Utc::now(),
        };
        let sink = Arc::clone(&self.deps.history);
        let table_id = self.id;
        tokio::spawn(async move {
            if let Err(err) = sink.record_hand(record).await {
                log::warn!("table {table_id}: hand history write failed: {err}");
            }
        });
    }

    /// Hand-boundary housekeeping followed by an attempt to deal.
    fn try_start_hand(&mut self) {
        if self.is_closed || self.hand_in_progress() {
            return;
        }
        self.apply_boundary_changes();
        if self.maybe_finish_cash_game() {
            return;
        }
        if self.is_paused {
            self.clear_hand();
            self.after_state_change();
            return;
        }
        let funded = self.seats.occupants().filter(|p| p.is_dealt_in()).count();
        if funded < MIN_PLAYERS_TO_DEAL {
            self.clear_hand();
            self.after_state_change();
            return;
        }
        let button = self
            .seats
            .next_matching(self.prev_button.unwrap_or(self.seats.capacity()), |p| {
                p.chips > 0
                    && matches!(
                        p.status,
                        PlayerStatus::Active
                            | PlayerStatus::Disconnected
                            | PlayerStatus::WaitingForNextHand
                    )
            });
        let Some(button) = button else {
            self.clear_hand();
            self.after_state_change();
            return;
        };
        self.hand_number += 1;
        let seed = self.config.deck_seed.unwrap_or_else(rand::random);
        match HandMachine::start(self.hand_number, button, self.blinds, seed, &mut self.seats) {
            Ok((machine, events)) => {
                log::debug!(
                    "table {} hand {} started (button {button})",
                    self.id,
                    self.hand_number
                );
                self.hand = Some(machine);
                self.pump(events);
            }
            Err(err) => {
                log::debug!("table {}: hand not started: {err}", self.id);
                self.hand_number -= 1;
                self.clear_hand();
                self.after_state_change();
            }
        }
    }

    /// Drop the hand and clear hand-scoped player state, so a `waiting`
    /// snapshot never carries contributions or community cards.
    fn clear_hand(&mut self) {
        self.hand = None;
        for player in self.seats.occupants_mut() {
            player.reset_for_hand();
        }
    }

    /// Apply everything deferred to the inter-hand boundary: stack edits,
    /// blind changes, and seat vacations.
    fn apply_boundary_changes(&mut self) {
        for (user_id, chips) in std::mem::take(&mut self.pending_stack_sets) {
            if let Some(player) = self.seats.player_by_user_mut(user_id) {
                player.chips = chips;
                player.all_in = false;
            }
        }
        if let Some(blinds) = self.pending_blinds.take() {
            self.blinds = blinds;
        }
        self.vacate_departing();
    }

    fn vacate_departing(&mut self) {
        let departing: Vec<SeatNumber> = self
            .seats
            .occupants()
            .filter(|p| {
                p.leaving
                    || matches!(
                        p.status,
                        PlayerStatus::Left | PlayerStatus::Removed | PlayerStatus::Eliminated
                    )
            })
            .map(|p| p.seat)
            .collect();
        for seat in departing {
            if let Some(player) = self.seats.vacate(seat) {
                self.departed_stacks.insert(player.user_id, player.chips);
                self.deps.sessions.set_game(player.user_id, None);
                self.cancel_grace_timer(player.user_id);
                self.broadcast(&ServerEvent::SeatVacated {
                    game_id: self.id,
                    seat_number: seat,
                });
                // A voluntary leaver who is still connected keeps watching
                // from the rail.
                if player.status == PlayerStatus::Left
                    && self.deps.registry.is_online(player.user_id)
                {
                    self.spectators.insert(player.user_id);
                    self.broadcast(&ServerEvent::PlayerMovedToSpectator {
                        game_id: self.id,
                        player_id: player.user_id,
                    });
                }
                log::info!(
                    "table {}: seat {seat} vacated (user {})",
                    self.id,
                    player.user_id
                );
            }
        }
    }

    /// Cash games end when at most one seated player still has chips.
    /// Returns true when the table closed.
    fn maybe_finish_cash_game(&mut self) -> bool {
        if self.config.tournament_id.is_some() {
            return false;
        }
        // A fully abandoned table closes quietly.
        if self.seats.occupied_count() == 0 && !self.starting_stacks.is_empty() {
            self.cancel_timers();
            self.is_closed = true;
            log::info!("table {} abandoned", self.id);
            return true;
        }
        if self.hands_played == 0 {
            return false;
        }
        let funded: Vec<UserId> = self
            .seats
            .occupants()
            .filter(|p| p.chips > 0)
            .map(|p| p.user_id)
            .collect();
        if funded.len() > 1 {
            return false;
        }
        let winner = funded.first().copied();
        self.close_table("completed", winner, true);
        true
    }

    fn close_table(&mut self, reason: &str, winner: Option<UserId>, with_stats: bool) {
        if self.is_closed {
            return;
        }
        let stats = with_stats.then(|| self.build_stats());
        self.broadcast(&ServerEvent::GameFinished {
            game_id: self.id,
            reason: reason.to_string(),
            winner_id: winner,
            timestamp: self.deps.clock.now_millis(),
            stats,
        });
        for user_id in self.seats.occupants().map(|p| p.user_id).collect::<Vec<_>>() {
            self.deps.sessions.set_game(user_id, None);
        }
        self.cancel_timers();
        self.is_closed = true;
        log::info!("table {} finished: {reason}", self.id);
    }

    fn build_stats(&self) -> GameStats {
        let mut final_stacks: HashMap<UserId, Chips> = self.departed_stacks.clone();
        for player in self.seats.occupants() {
            final_stacks.insert(player.user_id, player.chips);
        }
        let chip_changes = self
            .starting_stacks
            .iter()
            .map(|(&user_id, &start)| {
                let end = final_stacks.get(&user_id).copied().unwrap_or(0);
                (user_id, i64::from(end) - i64::from(start))
            })
            .collect();
        GameStats {
            total_hands: self.hands_played,
            starting_stacks: self.starting_stacks.clone(),
            final_stacks,
            chip_changes,
        }
    }

    /// Fatal invariant violation: refund this hand's contributions, emit a
    /// terminal event, and shut the table down. Contained to this table.
    fn abort_hand(&mut self) {
        log::error!("table {}: hand invariant violated, refunding", self.id);
        for player in self.seats.occupants_mut() {
            player.chips += player.total_bet_this_hand;
            player.total_bet_this_hand = 0;
            player.current_bet = 0;
        }
        self.hand = None;
        if let Some(tx) = &self.settlement_tx {
            let stacks = self
                .seats
                .occupants()
                .map(|p| (p.user_id, p.chips))
                .collect();
            let _ = tx.send(TableSettlement {
                table_id: self.id,
                stacks,
                busted: Vec::new(),
            });
        }
        self.close_table("internal", None, false);
    }

    // ------------------------------------------------------------------
    // Timers, snapshots, events
    // ------------------------------------------------------------------

    /// Broadcast fresh personalized snapshots and reconcile the turn timer
    /// with the current actor.
    fn after_state_change(&mut self) {
        if self.is_closed {
            return;
        }
        self.broadcast_snapshots();
        let turn = self
            .hand
            .as_ref()
            .filter(|h| h.phase != HandPhase::Settled)
            .and_then(|h| h.current_actor.map(|seat| (h.hand_number, h.phase, seat)));
        if turn == self.timed_turn {
            return;
        }
        if let Some(timer) = self.turn_timer.take() {
            self.deps.clock.cancel(timer);
        }
        self.timed_turn = turn;
        let Some((_, _, seat)) = turn else {
            return;
        };
        self.turn_generation += 1;
        let generation = self.turn_generation;
        let duration = self.config.variant.turn_timeout_millis;
        let deadline = self.deps.clock.now_millis() + duration;
        let handle = self.handle.clone();
        self.turn_timer = Some(self.deps.clock.schedule_at(
            deadline,
            Box::new(move || {
                let _ = handle.send(TableMessage::TurnTimeout { generation });
            }),
        ));
        self.broadcast(&ServerEvent::TurnTimerStarted {
            game_id: self.id,
            deadline,
            duration,
            active_seat: seat,
        });
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.turn_timer.take() {
            self.deps.clock.cancel(timer);
        }
        if let Some(timer) = self.interhand_timer.take() {
            self.deps.clock.cancel(timer);
        }
        for (_, (timer, _)) in self.grace_timers.drain() {
            self.deps.clock.cancel(timer);
        }
        self.timed_turn = None;
    }

    fn cancel_grace_timer(&mut self, user_id: UserId) {
        if let Some((timer, _)) = self.grace_timers.remove(&user_id) {
            self.deps.clock.cancel(timer);
        }
    }

    fn emit_status_update(&self, user_id: UserId, status: PlayerStatus, action: Option<String>) {
        self.broadcast(&ServerEvent::PlayerStatusUpdate {
            game_id: self.id,
            player_id: user_id,
            status,
            timestamp: self.deps.clock.now_millis(),
            action,
        });
    }

    fn broadcast(&self, event: &ServerEvent) {
        self.deps
            .broadcaster
            .publish(&Broadcaster::table_room(self.id), event);
    }

    fn broadcast_snapshots(&self) {
        let room = Broadcaster::table_room(self.id);
        self.deps
            .broadcaster
            .publish_each(&room, |viewer| ServerEvent::GameState(self.snapshot_for(Some(viewer))));
    }

    /// Build the authoritative snapshot for one viewer. Hole cards belong
    /// to their seat only; other viewers see just the showdown-revealed
    /// cards.
    fn snapshot_for(&self, viewer: Option<UserId>) -> GameStateSnapshot {
        let hand = self.hand.as_ref();
        let players = self
            .seats
            .occupants()
            .map(|p| {
                let hole_cards = if viewer == Some(p.user_id) {
                    Some(p.hole_cards.clone())
                } else if !p.revealed_indices.is_empty() {
                    Some(
                        p.revealed_indices
                            .iter()
                            .filter_map(|&i| p.hole_cards.get(i).copied())
                            .collect(),
                    )
                } else {
                    None
                };
                PlayerSnapshot {
                    user_id: p.user_id,
                    seat: p.seat,
                    chips: p.chips,
                    current_bet: p.current_bet,
                    total_bet_this_hand: p.total_bet_this_hand,
                    status: p.status,
                    folded: p.folded,
                    all_in: p.all_in,
                    hole_cards,
                    revealed_indices: p.revealed_indices.clone(),
                    disconnect_deadline: p.disconnect_deadline,
                }
            })
            .collect();
        let pots = hand
            .map(|h| {
                h.pots(&self.seats)
                    .into_iter()
                    .map(|pot| PotSnapshot {
                        amount: pot.amount,
                        eligible: pot.eligible.into_iter().collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        GameStateSnapshot {
            game_id: self.id,
            tournament_id: self.config.tournament_id,
            hand_number: hand.map_or(self.hand_number, |h| h.hand_number),
            current_phase: hand.map_or(HandPhase::Waiting, |h| h.phase),
            players,
            community_cards: hand.map(|h| h.board.clone()).unwrap_or_default(),
            pots,
            button_seat: hand.map(|h| h.button_seat),
            sb_seat: hand.map(|h| h.sb_seat),
            bb_seat: hand.map(|h| h.bb_seat),
            current_actor_seat: hand.and_then(|h| h.current_actor),
            min_raise: hand.map_or(0, |h| h.min_raise),
            last_raise_amount: hand.map_or(0, |h| h.last_raise_amount),
            high_bet: hand.map_or(0, |h| h.high_bet),
            small_blind: self.blinds.small,
            big_blind: self.blinds.big,
            is_paused: self.is_paused,
        }
    }
}
