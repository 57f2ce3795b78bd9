//! Per-variant FIFO matchmaking queues.
//!
//! Each variant owns one queue guarded by its own async mutex; the
//! dequeue-and-mint step runs inside that critical section so a user can
//! never be double-seated. The freshly minted table is registered in the
//! directory before `match_found` goes out, so a client that retries
//! `join_game` immediately will find it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::broadcast::Broadcaster;
use crate::clock::Clock;
use crate::connection::ConnectionRegistry;
use crate::game::entities::{UnixMillis, UserId, Variant};
use crate::net::ServerEvent;
use crate::sessions::ActiveSessions;
use crate::table::{TableConfig, TableManager};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MatchmakerError {
    #[error("Unknown queue")]
    UnknownQueue,
    #[error("Already in queue")]
    AlreadyQueued,
    #[error("Already in game")]
    AlreadyInGame,
    #[error("Not in queue")]
    NotQueued,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub enqueued_at: UnixMillis,
}

struct VariantQueue {
    variant: Variant,
    entries: Mutex<VecDeque<QueueEntry>>,
}

pub struct Matchmaker {
    queues: HashMap<String, VariantQueue>,
    clock: Arc<dyn Clock>,
    sessions: Arc<ActiveSessions>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    tables: Arc<TableManager>,
}

impl Matchmaker {
    #[must_use]
    pub fn new(
        variants: Vec<Variant>,
        clock: Arc<dyn Clock>,
        sessions: Arc<ActiveSessions>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        tables: Arc<TableManager>,
    ) -> Self {
        let queues = variants
            .into_iter()
            .map(|variant| {
                (
                    variant.slug.clone(),
                    VariantQueue {
                        variant,
                        entries: Mutex::new(VecDeque::new()),
                    },
                )
            })
            .collect();
        Self {
            queues,
            clock,
            sessions,
            registry,
            broadcaster,
            tables,
        }
    }

    #[must_use]
    pub fn variant(&self, slug: &str) -> Option<&Variant> {
        self.queues.get(slug).map(|q| &q.variant)
    }

    /// Enqueue a user. When the queue reaches the variant's target, the
    /// head entries are dequeued and seated at a freshly minted table in
    /// queue order, all inside the per-variant critical section.
    pub async fn join_queue(&self, user_id: UserId, slug: &str) -> Result<(), MatchmakerError> {
        let queue = self.queues.get(slug).ok_or(MatchmakerError::UnknownQueue)?;
        if self.sessions.game_of(user_id).is_some() {
            return Err(MatchmakerError::AlreadyInGame);
        }
        // One queue entry per user globally.
        if !self.sessions.try_claim_queue(user_id, slug) {
            return Err(MatchmakerError::AlreadyQueued);
        }

        let mut entries = queue.entries.lock().await;
        entries.push_back(QueueEntry {
            user_id,
            enqueued_at: self.clock.now_millis(),
        });
        log::debug!("user {user_id} joined queue {slug} ({} waiting)", entries.len());

        if entries.len() >= queue.variant.queue_target {
            let matched: Vec<QueueEntry> =
                entries.drain(..queue.variant.queue_target).collect();
            self.mint_match(&queue.variant, &matched).await;
        }
        let count = entries.len();
        drop(entries);
        self.publish_queue_info(slug, &queue.variant, count);
        Ok(())
    }

    pub async fn leave_queue(&self, user_id: UserId, slug: &str) -> Result<(), MatchmakerError> {
        let queue = self.queues.get(slug).ok_or(MatchmakerError::UnknownQueue)?;
        let mut entries = queue.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.user_id != user_id);
        if entries.len() == before {
            return Err(MatchmakerError::NotQueued);
        }
        self.sessions.set_queue(user_id, None);
        let count = entries.len();
        drop(entries);
        self.publish_queue_info(slug, &queue.variant, count);
        Ok(())
    }

    /// Queue membership and position for `check_queue_status`.
    pub async fn queue_status(&self, user_id: UserId) -> ServerEvent {
        for (slug, queue) in &self.queues {
            let entries = queue.entries.lock().await;
            if let Some(position) = entries.iter().position(|e| e.user_id == user_id) {
                return ServerEvent::QueueStatus {
                    queue_type: Some(slug.clone()),
                    position: Some(position + 1),
                };
            }
        }
        ServerEvent::QueueStatus {
            queue_type: None,
            position: None,
        }
    }

    async fn mint_match(&self, variant: &Variant, matched: &[QueueEntry]) {
        // The first hand deals only once every matched player is seated.
        let mut config = TableConfig::cash(variant.clone());
        config.auto_start = false;
        let (table_id, handle, _) = self.tables.create_table(config, None);
        for (index, entry) in matched.iter().enumerate() {
            self.sessions.set_queue(entry.user_id, None);
            match handle
                .sit_down(entry.user_id, Some(index + 1), Some(variant.starting_stack))
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    log::error!(
                        "match mint: failed to seat user {} at table {table_id}: {err}",
                        entry.user_id
                    );
                }
            }
        }
        let _ = handle.send(crate::table::TableMessage::StartHand);
        metrics::counter!("poker_matches_minted_total", "queue" => variant.slug.clone())
            .increment(1);
        log::info!(
            "queue {}: minted table {table_id} for {} players",
            variant.slug,
            matched.len()
        );
        // The table is addressable in the directory before this broadcast.
        for entry in matched {
            self.registry.send_to_user(
                entry.user_id,
                &ServerEvent::MatchFound {
                    game_id: table_id,
                    tournament_id: None,
                },
            );
        }
    }

    fn publish_queue_info(&self, slug: &str, variant: &Variant, count: usize) {
        self.broadcaster.publish(
            &Broadcaster::queue_room(slug),
            &ServerEvent::QueueInfo {
                queue_type: slug.to_string(),
                count,
                needed: variant.queue_target.saturating_sub(count),
                target: variant.queue_target,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::history::NullHistorySink;
    use crate::table::TableDeps;

    fn matchmaker() -> (Arc<ActiveSessions>, Arc<ConnectionRegistry>, Matchmaker) {
        let clock: Arc<dyn Clock> = Arc::new(VirtualClock::new(0));
        let sessions = Arc::new(ActiveSessions::new());
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&clock)));
        let broadcaster = Arc::new(Broadcaster::new());
        let deps = TableDeps {
            clock: Arc::clone(&clock),
            broadcaster: Arc::clone(&broadcaster),
            registry: Arc::clone(&registry),
            sessions: Arc::clone(&sessions),
            history: Arc::new(NullHistorySink),
        };
        let tables = TableManager::new(deps);
        let mm = Matchmaker::new(
            vec![Variant::heads_up(), Variant::six_max()],
            clock,
            Arc::clone(&sessions),
            Arc::clone(&registry),
            broadcaster,
            tables,
        );
        (sessions, registry, mm)
    }

    #[tokio::test]
    async fn unknown_queue_rejected() {
        let (_, _, mm) = matchmaker();
        assert_eq!(
            mm.join_queue(1, "omaha").await.unwrap_err(),
            MatchmakerError::UnknownQueue
        );
    }

    #[tokio::test]
    async fn duplicate_enqueue_rejected() {
        let (_, _, mm) = matchmaker();
        mm.join_queue(1, "six_max").await.unwrap();
        assert_eq!(
            mm.join_queue(1, "six_max").await.unwrap_err(),
            MatchmakerError::AlreadyQueued
        );
        // One entry per user globally, across variants too.
        assert_eq!(
            mm.join_queue(1, "heads_up").await.unwrap_err(),
            MatchmakerError::AlreadyQueued
        );
    }

    #[tokio::test]
    async fn heads_up_pairs_every_two() {
        let (sessions, registry, mm) = matchmaker();
        let (_, mut rx_a, _) = registry.register(1);
        let (_, mut rx_b, _) = registry.register(2);
        mm.join_queue(1, "heads_up").await.unwrap();
        assert!(sessions.queue_of(1).is_some());
        mm.join_queue(2, "heads_up").await.unwrap();

        let event_a = rx_a.try_recv().unwrap();
        let event_b = rx_b.try_recv().unwrap();
        let game_id = match event_a {
            ServerEvent::MatchFound { game_id, .. } => game_id,
            other => panic!("expected match_found, got {other:?}"),
        };
        assert!(matches!(event_b, ServerEvent::MatchFound { .. }));
        // Queue entries removed atomically on match.
        assert_eq!(sessions.queue_of(1), None);
        assert_eq!(sessions.game_of(1), Some(game_id));
        assert_eq!(sessions.game_of(2), Some(game_id));
    }

    #[tokio::test]
    async fn leftovers_stay_queued_in_order() {
        let (sessions, _, mm) = matchmaker();
        for user in 1..=3 {
            mm.join_queue(user, "heads_up").await.unwrap();
        }
        // Users 1 and 2 matched; user 3 still waiting at the head.
        assert_eq!(sessions.queue_of(3).as_deref(), Some("heads_up"));
        match mm.queue_status(3).await {
            ServerEvent::QueueStatus {
                queue_type,
                position,
            } => {
                assert_eq!(queue_type.as_deref(), Some("heads_up"));
                assert_eq!(position, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_in_game_cannot_queue() {
        let (sessions, _, mm) = matchmaker();
        sessions.set_game(5, Some(77));
        assert_eq!(
            mm.join_queue(5, "six_max").await.unwrap_err(),
            MatchmakerError::AlreadyInGame
        );
    }

    #[tokio::test]
    async fn leave_queue_clears_entry() {
        let (sessions, _, mm) = matchmaker();
        mm.join_queue(1, "six_max").await.unwrap();
        mm.leave_queue(1, "six_max").await.unwrap();
        assert_eq!(sessions.queue_of(1), None);
        assert_eq!(
            mm.leave_queue(1, "six_max").await.unwrap_err(),
            MatchmakerError::NotQueued
        );
    }
}
