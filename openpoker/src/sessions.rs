//! Active-session index.
//!
//! One record per user answering "where are you right now": at most one
//! seated game, one tournament registration, and one queue entry. The
//! matchmaker consults it for conflict checks and the router serves
//! `check_active_session` / `check_active_status` from it.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::game::entities::{TableId, TournamentId, UserId};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ActiveStatus {
    pub game: Option<TableId>,
    pub tournament: Option<TournamentId>,
    pub queue: Option<String>,
}

#[derive(Default)]
struct Entry {
    game_id: Option<TableId>,
    tournament_id: Option<TournamentId>,
    queue: Option<String>,
}

impl Entry {
    fn is_empty(&self) -> bool {
        self.game_id.is_none() && self.tournament_id.is_none() && self.queue.is_none()
    }
}

#[derive(Default)]
pub struct ActiveSessions {
    inner: RwLock<HashMap<UserId, Entry>>,
}

impl ActiveSessions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_game(&self, user_id: UserId, game_id: Option<TableId>) {
        let mut inner = self.inner.write().expect("sessions poisoned");
        let entry = inner.entry(user_id).or_default();
        entry.game_id = game_id;
        if entry.is_empty() {
            inner.remove(&user_id);
        }
    }

    pub fn set_tournament(&self, user_id: UserId, tournament_id: Option<TournamentId>) {
        let mut inner = self.inner.write().expect("sessions poisoned");
        let entry = inner.entry(user_id).or_default();
        entry.tournament_id = tournament_id;
        if entry.is_empty() {
            inner.remove(&user_id);
        }
    }

    /// Claim the user's single global queue slot. Returns false when the
    /// user is already queued anywhere.
    pub fn try_claim_queue(&self, user_id: UserId, queue: &str) -> bool {
        let mut inner = self.inner.write().expect("sessions poisoned");
        let entry = inner.entry(user_id).or_default();
        if entry.queue.is_some() {
            return false;
        }
        entry.queue = Some(queue.to_string());
        true
    }

    pub fn set_queue(&self, user_id: UserId, queue: Option<String>) {
        let mut inner = self.inner.write().expect("sessions poisoned");
        let entry = inner.entry(user_id).or_default();
        entry.queue = queue;
        if entry.is_empty() {
            inner.remove(&user_id);
        }
    }

    #[must_use]
    pub fn game_of(&self, user_id: UserId) -> Option<TableId> {
        self.inner
            .read()
            .expect("sessions poisoned")
            .get(&user_id)
            .and_then(|e| e.game_id)
    }

    #[must_use]
    pub fn queue_of(&self, user_id: UserId) -> Option<String> {
        self.inner
            .read()
            .expect("sessions poisoned")
            .get(&user_id)
            .and_then(|e| e.queue.clone())
    }

    #[must_use]
    pub fn tournament_of(&self, user_id: UserId) -> Option<TournamentId> {
        self.inner
            .read()
            .expect("sessions poisoned")
            .get(&user_id)
            .and_then(|e| e.tournament_id)
    }

    /// Consolidated status for `check_active_status`.
    #[must_use]
    pub fn status_of(&self, user_id: UserId) -> ActiveStatus {
        let inner = self.inner.read().expect("sessions poisoned");
        inner
            .get(&user_id)
            .map(|e| ActiveStatus {
                game: e.game_id,
                tournament: e.tournament_id,
                queue: e.queue.clone(),
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reflects_all_dimensions() {
        let sessions = ActiveSessions::new();
        sessions.set_game(1, Some(10));
        sessions.set_queue(1, Some("six_max".to_string()));
        let status = sessions.status_of(1);
        assert_eq!(status.game, Some(10));
        assert_eq!(status.queue.as_deref(), Some("six_max"));
        assert_eq!(status.tournament, None);
    }

    #[test]
    fn clearing_every_dimension_removes_the_entry() {
        let sessions = ActiveSessions::new();
        sessions.set_tournament(2, Some(5));
        sessions.set_tournament(2, None);
        assert_eq!(sessions.status_of(2), ActiveStatus::default());
        assert_eq!(sessions.tournament_of(2), None);
    }

    #[test]
    fn unknown_user_has_empty_status() {
        let sessions = ActiveSessions::new();
        assert_eq!(sessions.status_of(99), ActiveStatus::default());
        assert_eq!(sessions.game_of(99), None);
    }
}
