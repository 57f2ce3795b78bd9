//! Tournament supervisor actor.
//!
//! Owns registration, table creation, the blind clock, elimination
//! tracking, table balancing and merging, and prize positions. Tables are
//! reached only through their handles; chip counts are read from
//! settlement hooks, never mutated here.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::models::{
    Participant, ParticipantStatus, TournamentResultEntry, TournamentSettings, TournamentSnapshot,
    TournamentStatus,
};
use crate::broadcast::Broadcaster;
use crate::clock::TimerId;
use crate::constants::LEVEL_WARNING_LEAD_MILLIS;
use crate::db::TournamentStore;
use crate::game::entities::{
    SeatNumber, TableId, TournamentId, UnixMillis, UserId, Variant, VariantCategory,
};
use crate::net::messages::{ServerEvent, TournamentAdminCommand};
use crate::table::{TableConfig, TableDeps, TableError, TableManager, TableMessage, TableSettlement};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TournamentError {
    #[error("Host only")]
    HostOnly,
    #[error("Not available in this status")]
    WrongStatus,
    #[error("Already registered")]
    AlreadyRegistered,
    #[error("Not registered")]
    NotRegistered,
    #[error("Tournament is full")]
    Full,
    #[error("Banned from this tournament")]
    Banned,
    #[error("Need 2+ participants")]
    NotEnoughPlayers,
    #[error("{0}")]
    InvalidSettings(String),
    #[error("Tournament is over")]
    Closed,
}

#[derive(Debug)]
pub enum TournamentMessage {
    Register {
        user_id: UserId,
        response: oneshot::Sender<Result<(), TournamentError>>,
    },
    Unregister {
        user_id: UserId,
        response: oneshot::Sender<Result<(), TournamentError>>,
    },
    Admin {
        user_id: UserId,
        action: TournamentAdminCommand,
        response: oneshot::Sender<Result<(), TournamentError>>,
    },
    GetState {
        response: oneshot::Sender<TournamentSnapshot>,
    },
    TableSettled(TableSettlement),
    LevelTimer { generation: u64 },
    WarningTimer { generation: u64 },
}

/// Cloneable handle to a supervisor actor.
#[derive(Clone, Debug)]
pub struct TournamentHandle {
    sender: mpsc::UnboundedSender<TournamentMessage>,
    tournament_id: TournamentId,
}

impl TournamentHandle {
    #[must_use]
    pub fn tournament_id(&self) -> TournamentId {
        self.tournament_id
    }

    pub fn send(&self, message: TournamentMessage) -> Result<(), TournamentError> {
        self.sender.send(message).map_err(|_| TournamentError::Closed)
    }

    pub async fn register(&self, user_id: UserId) -> Result<(), TournamentError> {
        let (tx, rx) = oneshot::channel();
        self.send(TournamentMessage::Register {
            user_id,
            response: tx,
        })?;
        rx.await.map_err(|_| TournamentError::Closed)?
    }

    pub async fn unregister(&self, user_id: UserId) -> Result<(), TournamentError> {
        let (tx, rx) = oneshot::channel();
        self.send(TournamentMessage::Unregister {
            user_id,
            response: tx,
        })?;
        rx.await.map_err(|_| TournamentError::Closed)?
    }

    pub async fn admin(
        &self,
        user_id: UserId,
        action: TournamentAdminCommand,
    ) -> Result<(), TournamentError> {
        let (tx, rx) = oneshot::channel();
        self.send(TournamentMessage::Admin {
            user_id,
            action,
            response: tx,
        })?;
        rx.await.map_err(|_| TournamentError::Closed)?
    }

    pub async fn state(&self) -> Result<TournamentSnapshot, TournamentError> {
        let (tx, rx) = oneshot::channel();
        self.send(TournamentMessage::GetState { response: tx })?;
        rx.await.map_err(|_| TournamentError::Closed)
    }
}

pub struct TournamentSupervisor {
    id: TournamentId,
    host_id: UserId,
    settings: TournamentSettings,
    status: TournamentStatus,
    participants: HashMap<UserId, Participant>,
    banned: HashSet<UserId>,

    current_level: usize,
    level_ends_at: Option<UnixMillis>,
    level_remaining_on_pause: Option<u64>,
    level_generation: u64,
    level_timer: Option<TimerId>,
    warning_timer: Option<TimerId>,

    tables: HashSet<TableId>,
    settlement_tx: mpsc::UnboundedSender<TableSettlement>,

    deps: TableDeps,
    table_manager: Arc<TableManager>,
    store: Option<Arc<TournamentStore>>,
    inbox: mpsc::UnboundedReceiver<TournamentMessage>,
    handle: TournamentHandle,
}

impl TournamentSupervisor {
    pub fn new(
        id: TournamentId,
        host_id: UserId,
        settings: TournamentSettings,
        deps: TableDeps,
        table_manager: Arc<TableManager>,
        store: Option<Arc<TournamentStore>>,
    ) -> (Self, TournamentHandle) {
        let (sender, inbox) = mpsc::unbounded_channel();
        let handle = TournamentHandle {
            sender,
            tournament_id: id,
        };
        // Settlement hooks from tables are forwarded into the mailbox so
        // the supervisor stays a single writer.
        let (settlement_tx, mut settlement_rx) = mpsc::unbounded_channel::<TableSettlement>();
        {
            let handle = handle.clone();
            tokio::spawn(async move {
                while let Some(settlement) = settlement_rx.recv().await {
                    if handle
                        .send(TournamentMessage::TableSettled(settlement))
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
        let supervisor = Self {
            id,
            host_id,
            settings,
            status: TournamentStatus::Setup,
            participants: HashMap::new(),
            banned: HashSet::new(),
            current_level: 0,
            level_ends_at: None,
            level_remaining_on_pause: None,
            level_generation: 0,
            level_timer: None,
            warning_timer: None,
            tables: HashSet::new(),
            settlement_tx,
            deps,
            table_manager,
            store,
            inbox,
            handle: handle.clone(),
        };
        (supervisor, handle)
    }

    /// Run the mailbox loop. Terminal tournaments keep serving state
    /// queries; mutating commands are rejected by their status checks.
    pub async fn run(mut self) {
        log::info!("tournament {} starting in setup", self.id);
        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;
        }
        self.cancel_level_timers();
        log::info!("tournament {} supervisor stopped", self.id);
    }

    async fn handle_message(&mut self, message: TournamentMessage) {
        match message {
            TournamentMessage::Register { user_id, response } => {
                let _ = response.send(self.handle_register(user_id));
            }
            TournamentMessage::Unregister { user_id, response } => {
                let _ = response.send(self.handle_unregister(user_id));
            }
            TournamentMessage::Admin {
                user_id,
                action,
                response,
            } => {
                let _ = response.send(self.handle_admin(user_id, action).await);
            }
            TournamentMessage::GetState { response } => {
                let _ = response.send(self.snapshot());
            }
            TournamentMessage::TableSettled(settlement) => {
                self.handle_settlement(settlement).await;
            }
            TournamentMessage::LevelTimer { generation } => {
                if generation == self.level_generation && self.status == TournamentStatus::Active {
                    self.advance_blind_level();
                }
            }
            TournamentMessage::WarningTimer { generation } => {
                if generation == self.level_generation && self.status == TournamentStatus::Active {
                    self.publish(&ServerEvent::TournamentLevelWarning {
                        tournament_id: self.id,
                        time_remaining_ms: LEVEL_WARNING_LEAD_MILLIS,
                        current_level: self.current_level,
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    fn handle_register(&mut self, user_id: UserId) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::Registration {
            return Err(TournamentError::WrongStatus);
        }
        if self.banned.contains(&user_id) {
            return Err(TournamentError::Banned);
        }
        if self.participants.contains_key(&user_id) {
            return Err(TournamentError::AlreadyRegistered);
        }
        if let Some(max) = self.settings.max_players
            && self.participants.len() >= max
        {
            return Err(TournamentError::Full);
        }
        let participant = Participant::registered(user_id);
        self.persist_participant(&participant);
        self.participants.insert(user_id, participant);
        self.deps.sessions.set_tournament(user_id, Some(self.id));
        self.publish(&ServerEvent::TournamentPlayerRegistered {
            tournament_id: self.id,
            user_id,
        });
        self.publish_count();
        Ok(())
    }

    fn handle_unregister(&mut self, user_id: UserId) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::Registration {
            return Err(TournamentError::WrongStatus);
        }
        if self.participants.remove(&user_id).is_none() {
            return Err(TournamentError::NotRegistered);
        }
        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            let id = self.id;
            tokio::spawn(async move {
                if let Err(err) = store.delete_participant(id, user_id).await {
                    log::warn!("tournament {id}: participant delete failed: {err}");
                }
            });
        }
        self.deps.sessions.set_tournament(user_id, None);
        self.publish(&ServerEvent::TournamentPlayerUnregistered {
            tournament_id: self.id,
            user_id,
        });
        self.publish_count();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin actions
    // ------------------------------------------------------------------

    async fn handle_admin(
        &mut self,
        user_id: UserId,
        action: TournamentAdminCommand,
    ) -> Result<(), TournamentError> {
        if user_id != self.host_id {
            return Err(TournamentError::HostOnly);
        }
        match action {
            TournamentAdminCommand::UpdateSettings { settings } => {
                if self.status != TournamentStatus::Setup {
                    return Err(TournamentError::WrongStatus);
                }
                settings
                    .validate()
                    .map_err(TournamentError::InvalidSettings)?;
                self.settings = settings;
                self.persist_tournament();
                Ok(())
            }
            TournamentAdminCommand::OpenRegistration => {
                if self.status != TournamentStatus::Setup {
                    return Err(TournamentError::WrongStatus);
                }
                self.transition(TournamentStatus::Registration);
                Ok(())
            }
            TournamentAdminCommand::StartTournament => self.start().await,
            TournamentAdminCommand::PauseTournament => {
                if self.status != TournamentStatus::Active {
                    return Err(TournamentError::WrongStatus);
                }
                self.pause_clock();
                self.set_tables_paused(true);
                self.transition(TournamentStatus::Paused);
                Ok(())
            }
            TournamentAdminCommand::ResumeTournament => {
                if self.status != TournamentStatus::Paused {
                    return Err(TournamentError::WrongStatus);
                }
                self.transition(TournamentStatus::Active);
                self.resume_clock();
                self.set_tables_paused(false);
                Ok(())
            }
            TournamentAdminCommand::CancelTournament => {
                if self.status.is_terminal() {
                    return Err(TournamentError::WrongStatus);
                }
                self.cancel_tournament();
                Ok(())
            }
            TournamentAdminCommand::BanPlayer { user_id: target } => {
                self.ban_player(target).await;
                Ok(())
            }
            TournamentAdminCommand::RegisterPlayer { user_id: target } => {
                self.handle_register(target)
            }
            TournamentAdminCommand::TransferPlayer { user_id: target } => {
                self.transfer_player(target).await;
                Ok(())
            }
        }
    }

    async fn start(&mut self) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::Registration {
            return Err(TournamentError::WrongStatus);
        }
        if self.participants.len() < 2 {
            return Err(TournamentError::NotEnoughPlayers);
        }
        let per_table = self.settings.max_players_per_table;
        let count = self.participants.len();
        let table_count = count.div_ceil(per_table);

        // Reproducible seat draw: participant ids in sorted order, then a
        // shuffle seeded from the tournament id.
        let mut order: Vec<UserId> = self.participants.keys().copied().collect();
        order.sort_unstable();
        let mut rng = StdRng::seed_from_u64(self.id as u64);
        order.shuffle(&mut rng);

        let mut handles = Vec::with_capacity(table_count);
        for _ in 0..table_count {
            let config = TableConfig::tournament(self.table_variant(), self.id);
            let (table_id, handle, _) = self
                .table_manager
                .create_table(config, Some(self.settlement_tx.clone()));
            self.tables.insert(table_id);
            handles.push((table_id, handle));
        }

        for (index, user_id) in order.iter().enumerate() {
            let (table_id, handle) = &handles[index % table_count];
            let seat = index / table_count + 1;
            match handle
                .sit_down(*user_id, Some(seat), Some(self.settings.starting_stack))
                .await
            {
                Ok(seat) => {
                    if let Some(participant) = self.participants.get_mut(user_id) {
                        participant.status = ParticipantStatus::Active;
                        participant.current_stack = self.settings.starting_stack;
                        participant.current_table_id = Some(*table_id);
                        participant.current_seat = Some(seat);
                    }
                    self.deps.broadcaster.join_room_user(
                        &self.deps.registry,
                        &Broadcaster::table_room(*table_id),
                        *user_id,
                    );
                    self.deps.registry.send_to_user(
                        *user_id,
                        &ServerEvent::MatchFound {
                            game_id: *table_id,
                            tournament_id: Some(self.id),
                        },
                    );
                }
                Err(err) => {
                    log::error!(
                        "tournament {}: failed to seat {user_id} at table {table_id}: {err}",
                        self.id
                    );
                }
            }
        }
        for participant in self.participants.values() {
            self.persist_participant(participant);
        }

        self.current_level = 0;
        self.transition(TournamentStatus::Active);
        self.schedule_level(self.settings.blind_level_duration_millis);
        self.set_tables_paused(false);
        log::info!(
            "tournament {} started: {count} players across {table_count} tables",
            self.id
        );
        Ok(())
    }

    async fn ban_player(&mut self, target: UserId) {
        self.banned.insert(target);
        self.publish(&ServerEvent::TournamentPlayerBanned {
            tournament_id: self.id,
            user_id: target,
        });
        let Some((status, table_id)) = self
            .participants
            .get(&target)
            .map(|p| (p.status, p.current_table_id))
        else {
            return;
        };
        match status {
            ParticipantStatus::Registered => {
                // Pre-start: identical to an unregister.
                self.participants.remove(&target);
                self.deps.sessions.set_tournament(target, None);
                self.publish_count();
            }
            ParticipantStatus::Active | ParticipantStatus::Transferred => {
                // Mid-game: auto-fold + left at the table; chips already in
                // the pot stay there. The elimination is recorded now.
                if let Some(table_id) = table_id
                    && let Some(handle) = self.table_manager.get(table_id)
                {
                    let _ = handle.send(TableMessage::MarkLeft { user_id: target });
                }
                self.eliminate(target);
                self.check_completion().await;
            }
            ParticipantStatus::Eliminated => {}
        }
    }

    async fn transfer_player(&mut self, target: UserId) {
        let Some(participant) = self.participants.get(&target) else {
            return;
        };
        let Some(source) = participant.current_table_id else {
            return;
        };
        let sizes = self.table_sizes();
        let destination = sizes
            .iter()
            .filter(|(table_id, _)| *table_id != source)
            .min_by_key(|(_, size)| *size)
            .map(|(table_id, _)| *table_id);
        if let Some(destination) = destination {
            self.move_player(target, source, destination).await;
        }
    }

    fn cancel_tournament(&mut self) {
        self.cancel_level_timers();
        self.close_all_tables("cancelled");
        for participant in self.participants.values() {
            self.deps
                .sessions
                .set_tournament(participant.user_id, None);
        }
        self.transition(TournamentStatus::Cancelled);
        self.publish(&ServerEvent::TournamentCancelled {
            tournament_id: self.id,
        });
    }

    // ------------------------------------------------------------------
    // Blind clock
    // ------------------------------------------------------------------

    fn schedule_level(&mut self, duration: u64) {
        self.cancel_level_timers();
        let now = self.deps.clock.now_millis();
        let ends_at = now + duration;
        self.level_ends_at = Some(ends_at);
        self.level_generation += 1;
        let generation = self.level_generation;
        if duration > LEVEL_WARNING_LEAD_MILLIS {
            let handle = self.handle.clone();
            self.warning_timer = Some(self.deps.clock.schedule_at(
                ends_at - LEVEL_WARNING_LEAD_MILLIS,
                Box::new(move || {
                    let _ = handle.send(TournamentMessage::WarningTimer { generation });
                }),
            ));
        }
        let handle = self.handle.clone();
        self.level_timer = Some(self.deps.clock.schedule_at(
            ends_at,
            Box::new(move || {
                let _ = handle.send(TournamentMessage::LevelTimer { generation });
            }),
        ));
    }

    /// Pause stops the clock by recording the exact remaining time.
    fn pause_clock(&mut self) {
        let now = self.deps.clock.now_millis();
        self.level_remaining_on_pause =
            self.level_ends_at.map(|ends_at| ends_at.saturating_sub(now));
        self.cancel_level_timers();
        self.level_ends_at = None;
    }

    fn resume_clock(&mut self) {
        let remaining = self
            .level_remaining_on_pause
            .take()
            .unwrap_or(self.settings.blind_level_duration_millis);
        self.schedule_level(remaining);
    }

    fn advance_blind_level(&mut self) {
        if self.current_level + 1 >= self.settings.blind_structure.len() {
            // Final level runs until the tournament ends.
            self.level_ends_at = None;
            return;
        }
        self.current_level += 1;
        let level = self.settings.level(self.current_level);
        self.schedule_level(self.settings.blind_level_duration_millis);
        let level_ends_at = self.level_ends_at.unwrap_or_default();
        self.publish(&ServerEvent::TournamentBlindLevelAdvanced {
            tournament_id: self.id,
            level: self.current_level,
            small_blind: level.small,
            big_blind: level.big,
            level_ends_at,
        });
        // New blinds reach each alive table, effective at its next hand.
        for &table_id in &self.tables {
            if let Some(handle) = self.table_manager.get(table_id) {
                let _ = handle.send(TableMessage::SetBlinds {
                    blinds: crate::game::entities::Blinds::new(level.small, level.big),
                });
            }
        }
        self.persist_tournament();
        log::info!(
            "tournament {}: blinds advanced to level {} ({}/{})",
            self.id,
            self.current_level,
            level.small,
            level.big
        );
    }

    fn cancel_level_timers(&mut self) {
        if let Some(timer) = self.level_timer.take() {
            self.deps.clock.cancel(timer);
        }
        if let Some(timer) = self.warning_timer.take() {
            self.deps.clock.cancel(timer);
        }
    }

    // ------------------------------------------------------------------
    // Settlement, elimination, balancing, merging
    // ------------------------------------------------------------------

    async fn handle_settlement(&mut self, settlement: TableSettlement) {
        if self.status.is_terminal() {
            return;
        }
        for (user_id, chips) in &settlement.stacks {
            if let Some(participant) = self.participants.get_mut(user_id) {
                participant.current_stack = *chips;
            }
        }
        let mut busted = settlement.busted.clone();
        busted.sort_unstable();
        for user_id in busted {
            self.eliminate(user_id);
        }
        if self.check_completion().await {
            return;
        }
        self.rebalance().await;
    }

    /// Record one elimination. Finish position is the count of active
    /// participants at the moment the player busts, so the last two places
    /// resolve to 2 then 1.
    fn eliminate(&mut self, user_id: UserId) {
        let actives_before = self.active_count();
        let Some(participant) = self.participants.get_mut(&user_id) else {
            return;
        };
        if participant.status == ParticipantStatus::Eliminated {
            return;
        }
        let position = actives_before;
        participant.status = ParticipantStatus::Eliminated;
        participant.current_stack = 0;
        participant.current_table_id = None;
        participant.current_seat = None;
        participant.finish_position = Some(position);
        participant.eliminated_at = Some(self.deps.clock.now_millis());
        let record = participant.clone();
        self.persist_participant(&record);
        self.deps.sessions.set_tournament(user_id, None);
        let event = ServerEvent::TournamentPlayerEliminated {
            tournament_id: self.id,
            user_id,
            finish_position: position,
        };
        self.publish(&event);
        // Personalized position notification for the player.
        self.deps.registry.send_to_user(user_id, &event);
        log::info!(
            "tournament {}: user {user_id} eliminated in position {position}",
            self.id
        );
    }

    async fn check_completion(&mut self) -> bool {
        if self.active_count() != 1 {
            return false;
        }
        let winner_id = self
            .participants
            .values()
            .find(|p| {
                matches!(
                    p.status,
                    ParticipantStatus::Active | ParticipantStatus::Transferred
                )
            })
            .map(|p| p.user_id)
            .unwrap_or_default();
        // After completion no participant stays active; the winner is
        // recorded as position 1.
        if let Some(winner) = self.participants.get_mut(&winner_id) {
            winner.status = ParticipantStatus::Eliminated;
            winner.finish_position = Some(1);
            winner.current_table_id = None;
            winner.current_seat = None;
        }
        let record = self.participants.get(&winner_id).cloned();
        if let Some(record) = record {
            self.persist_participant(&record);
        }
        self.cancel_level_timers();
        self.close_all_tables("completed");
        let mut results: Vec<TournamentResultEntry> = self
            .participants
            .values()
            .filter_map(|p| {
                p.finish_position.map(|finish_position| TournamentResultEntry {
                    user_id: p.user_id,
                    finish_position,
                })
            })
            .collect();
        results.sort_unstable_by_key(|r| r.finish_position);
        self.transition(TournamentStatus::Completed);
        self.publish(&ServerEvent::TournamentCompleted {
            tournament_id: self.id,
            winner_id,
            results,
        });
        self.deps.sessions.set_tournament(winner_id, None);
        log::info!("tournament {} completed, winner {winner_id}", self.id);
        true
    }

    /// Sizes of alive tables by count of active participants.
    fn table_sizes(&self) -> Vec<(TableId, usize)> {
        let mut sizes: HashMap<TableId, usize> =
            self.tables.iter().map(|&id| (id, 0)).collect();
        for participant in self.participants.values() {
            if participant.status != ParticipantStatus::Eliminated
                && let Some(table_id) = participant.current_table_id
            {
                *sizes.entry(table_id).or_default() += 1;
            }
        }
        let mut sizes: Vec<(TableId, usize)> = sizes.into_iter().collect();
        sizes.sort_unstable();
        sizes
    }

    async fn rebalance(&mut self) {
        let per_table = self.settings.max_players_per_table;
        // Merge while the field fits on fewer tables. Bounded by the table
        // count so a deferred move (player mid-hand) cannot spin.
        for _ in 0..self.tables.len() {
            let sizes = self.table_sizes();
            if sizes.len() < 2 {
                break;
            }
            let total: usize = sizes.iter().map(|(_, n)| n).sum();
            if total > (sizes.len() - 1) * per_table {
                break;
            }
            let (smallest, _) = *sizes
                .iter()
                .min_by_key(|(table_id, n)| (*n, *table_id))
                .expect("at least two tables");
            self.merge_table(smallest).await;
        }
        // Then move one player if the imbalance is still 2 or more.
        let sizes = self.table_sizes();
        if sizes.len() < 2 {
            return;
        }
        let (biggest, max_size) = *sizes
            .iter()
            .max_by_key(|(table_id, n)| (*n, std::cmp::Reverse(*table_id)))
            .expect("at least two tables");
        let (smallest, min_size) = *sizes
            .iter()
            .min_by_key(|(table_id, n)| (*n, *table_id))
            .expect("at least two tables");
        if max_size - min_size < 2 {
            return;
        }
        if let Some(user_id) = self.pick_transfer_candidate(biggest).await {
            self.move_player(user_id, biggest, smallest).await;
            self.publish(&ServerEvent::TournamentTablesBalanced {
                tournament_id: self.id,
                table_sizes: self.table_sizes(),
            });
        }
    }

    /// Choose the occupant whose seat is farthest clockwise from the
    /// table's button, so pending blind posts are not interrupted.
    async fn pick_transfer_candidate(&self, table_id: TableId) -> Option<UserId> {
        let handle = self.table_manager.get(table_id)?;
        let snapshot = handle.snapshot(None).await.ok()?;
        let button = snapshot.button_seat.unwrap_or(1);
        let capacity = self.settings.max_players_per_table;
        let distance = |seat: SeatNumber| -> usize { (seat + capacity - button - 1) % capacity };
        snapshot
            .players
            .iter()
            .max_by_key(|p| distance(p.seat))
            .map(|p| p.user_id)
    }

    async fn move_player(&mut self, user_id: UserId, source: TableId, target: TableId) {
        let Some(source_handle) = self.table_manager.get(source) else {
            return;
        };
        let Some(target_handle) = self.table_manager.get(target) else {
            return;
        };
        let chips = match source_handle.remove_for_transfer(user_id).await {
            Ok(chips) => chips,
            Err(TableError::PlayerInHand) => {
                log::debug!(
                    "tournament {}: {user_id} mid-hand, balancing deferred",
                    self.id
                );
                return;
            }
            Err(err) => {
                log::warn!("tournament {}: transfer remove failed: {err}", self.id);
                return;
            }
        };
        match target_handle.sit_down(user_id, None, Some(chips)).await {
            Ok(seat) => {
                if let Some(participant) = self.participants.get_mut(&user_id) {
                    participant.current_table_id = Some(target);
                    participant.current_seat = Some(seat);
                    participant.status = ParticipantStatus::Active;
                }
                let record = self.participants.get(&user_id).cloned();
                if let Some(record) = record {
                    self.persist_participant(&record);
                }
                self.deps
                    .broadcaster
                    .leave_room_user(&Broadcaster::table_room(source), user_id);
                self.deps.broadcaster.join_room_user(
                    &self.deps.registry,
                    &Broadcaster::table_room(target),
                    user_id,
                );
                self.deps.registry.send_to_user(
                    user_id,
                    &ServerEvent::TournamentPlayerTransferred {
                        tournament_id: self.id,
                        user_id,
                        source_table_id: source,
                        target_table_id: target,
                        target_seat: seat,
                    },
                );
                log::info!(
                    "tournament {}: moved {user_id} from table {source} to {target} seat {seat}",
                    self.id
                );
            }
            Err(err) => {
                log::error!(
                    "tournament {}: transfer seat failed for {user_id}: {err}",
                    self.id
                );
            }
        }
    }

    async fn merge_table(&mut self, source: TableId) {
        let movers: Vec<UserId> = self
            .participants
            .values()
            .filter(|p| {
                p.status != ParticipantStatus::Eliminated
                    && p.current_table_id == Some(source)
            })
            .map(|p| p.user_id)
            .collect();
        for user_id in movers {
            let sizes = self.table_sizes();
            let target = sizes
                .iter()
                .filter(|(table_id, n)| {
                    *table_id != source && *n < self.settings.max_players_per_table
                })
                .min_by_key(|(_, n)| *n)
                .map(|(table_id, _)| *table_id);
            let Some(target) = target else { break };
            self.move_player(user_id, source, target).await;
        }
        // A mover caught mid-hand defers the whole merge to a later
        // settlement; the table only closes once it is empty.
        let stragglers = self.participants.values().any(|p| {
            p.status != ParticipantStatus::Eliminated && p.current_table_id == Some(source)
        });
        if stragglers {
            log::debug!("tournament {}: merge of table {source} deferred", self.id);
            return;
        }
        if let Some(handle) = self.table_manager.get(source) {
            let _ = handle.send(TableMessage::Close {
                reason: "merged".to_string(),
            });
        }
        self.tables.remove(&source);
        self.publish(&ServerEvent::TournamentTablesMerged {
            tournament_id: self.id,
            closed_table_id: source,
        });
        log::info!("tournament {}: merged away table {source}", self.id);
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn active_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| {
                matches!(
                    p.status,
                    ParticipantStatus::Active | ParticipantStatus::Transferred
                )
            })
            .count()
    }

    fn table_variant(&self) -> Variant {
        let level = self.settings.level(self.current_level);
        Variant {
            slug: format!("mtt_{}", self.id),
            name: self.settings.title.clone(),
            max_players: self.settings.max_players_per_table,
            small_blind: level.small,
            big_blind: level.big,
            starting_stack: self.settings.starting_stack,
            buy_in: 0,
            category: VariantCategory::Tournament,
            turn_timeout_millis: crate::constants::DEFAULT_TURN_TIMEOUT_MILLIS,
            disconnect_grace_millis: crate::constants::DEFAULT_DISCONNECT_GRACE_MILLIS,
            queue_target: self.settings.max_players_per_table,
        }
    }

    fn set_tables_paused(&self, paused: bool) {
        for &table_id in &self.tables {
            if let Some(handle) = self.table_manager.get(table_id) {
                let _ = handle.send(TableMessage::SetPaused { paused });
            }
        }
    }

    fn close_all_tables(&mut self, reason: &str) {
        for table_id in self.tables.drain() {
            if let Some(handle) = self.table_manager.get(table_id) {
                let _ = handle.send(TableMessage::Close {
                    reason: reason.to_string(),
                });
            }
        }
    }

    fn transition(&mut self, status: TournamentStatus) {
        self.status = status;
        self.persist_tournament();
        self.publish(&ServerEvent::TournamentStatusChanged {
            tournament_id: self.id,
            status,
        });
    }

    fn publish(&self, event: &ServerEvent) {
        self.deps
            .broadcaster
            .publish(&Broadcaster::tournament_room(self.id), event);
    }

    fn publish_count(&self) {
        self.publish(&ServerEvent::TournamentParticipantCountChanged {
            tournament_id: self.id,
            count: self.participants.len(),
        });
    }

    fn snapshot(&self) -> TournamentSnapshot {
        let mut participants: Vec<Participant> = self.participants.values().cloned().collect();
        participants.sort_unstable_by_key(|p| p.user_id);
        let mut table_ids: Vec<TableId> = self.tables.iter().copied().collect();
        table_ids.sort_unstable();
        TournamentSnapshot {
            tournament_id: self.id,
            host_id: self.host_id,
            title: self.settings.title.clone(),
            status: self.status,
            settings: self.settings.clone(),
            participants,
            current_blind_level: self.current_level,
            level_ends_at: self.level_ends_at,
            table_ids,
        }
    }

    fn persist_tournament(&self) {
        let Some(store) = &self.store else { return };
        let store = Arc::clone(store);
        let id = self.id;
        let host_id = self.host_id;
        let settings = self.settings.clone();
        let status = self.status;
        let level = self.current_level;
        tokio::spawn(async move {
            if let Err(err) = store
                .upsert_tournament(id, host_id, &settings, status, level)
                .await
            {
                log::warn!("tournament {id}: metadata persist failed: {err}");
            }
        });
    }

    fn persist_participant(&self, participant: &Participant) {
        let Some(store) = &self.store else { return };
        let store = Arc::clone(store);
        let id = self.id;
        let participant = participant.clone();
        tokio::spawn(async move {
            if let Err(err) = store.upsert_participant(id, &participant).await {
                log::warn!("tournament {id}: participant persist failed: {err}");
            }
        });
    }
}

/// Directory of live tournaments.
pub struct TournamentDirectory {
    deps: TableDeps,
    table_manager: Arc<TableManager>,
    store: Option<Arc<TournamentStore>>,
    tournaments: RwLock<HashMap<TournamentId, TournamentHandle>>,
    next_id: AtomicI64,
}

impl TournamentDirectory {
    #[must_use]
    pub fn new(
        deps: TableDeps,
        table_manager: Arc<TableManager>,
        store: Option<Arc<TournamentStore>>,
    ) -> Self {
        Self {
            deps,
            table_manager,
            store,
            tournaments: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Create a tournament in `Setup` owned by `host_id`.
    pub fn create(&self, host_id: UserId, settings: TournamentSettings) -> Result<(TournamentId, TournamentHandle), TournamentError> {
        settings
            .validate()
            .map_err(TournamentError::InvalidSettings)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (supervisor, handle) = TournamentSupervisor::new(
            id,
            host_id,
            settings,
            self.deps.clone(),
            Arc::clone(&self.table_manager),
            self.store.clone(),
        );
        self.tournaments
            .write()
            .expect("tournaments poisoned")
            .insert(id, handle.clone());
        tokio::spawn(supervisor.run());
        Ok((id, handle))
    }

    #[must_use]
    pub fn get(&self, tournament_id: TournamentId) -> Option<TournamentHandle> {
        self.tournaments
            .read()
            .expect("tournaments poisoned")
            .get(&tournament_id)
            .cloned()
    }
}
