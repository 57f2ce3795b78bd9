//! Shared harness for runtime integration tests: a virtual clock, wired
//! collaborators, and helpers for draining per-user event streams.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use openpoker::broadcast::Broadcaster;
use openpoker::clock::{Clock, VirtualClock};
use openpoker::connection::ConnectionRegistry;
use openpoker::history::MemoryHistorySink;
use openpoker::net::ServerEvent;
use openpoker::sessions::ActiveSessions;
use openpoker::table::{TableDeps, TableManager};
use openpoker::{Matchmaker, UserId, Variant};

pub struct Harness {
    pub clock: Arc<VirtualClock>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub sessions: Arc<ActiveSessions>,
    pub tables: Arc<TableManager>,
    pub history: Arc<MemoryHistorySink>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(VirtualClock::new(1_000_000));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&dyn_clock)));
        let broadcaster = Arc::new(Broadcaster::new());
        let sessions = Arc::new(ActiveSessions::new());
        let history = Arc::new(MemoryHistorySink::default());
        let deps = TableDeps {
            clock: dyn_clock,
            broadcaster: Arc::clone(&broadcaster),
            registry: Arc::clone(&registry),
            sessions: Arc::clone(&sessions),
            history: Arc::clone(&history) as Arc<dyn openpoker::history::HandHistorySink>,
        };
        let tables = TableManager::new(deps);
        Self {
            clock,
            registry,
            broadcaster,
            sessions,
            tables,
            history,
        }
    }

    pub fn matchmaker(&self, variants: Vec<Variant>) -> Matchmaker {
        Matchmaker::new(
            variants,
            self.clock.clone(),
            Arc::clone(&self.sessions),
            Arc::clone(&self.registry),
            Arc::clone(&self.broadcaster),
            Arc::clone(&self.tables),
        )
    }

    /// Register a socket for `user` and subscribe it to a room, the way
    /// the session router would.
    pub fn connect_to_room(&self, user: UserId, room: &str) -> EventStream {
        let (conn_id, rx, sender) = self.registry.register(user);
        self.broadcaster.join_room(room, conn_id, user, sender);
        EventStream { rx }
    }

    /// Register a socket without any room membership.
    pub fn connect(&self, user: UserId) -> EventStream {
        let (_, rx, _) = self.registry.register(user);
        EventStream { rx }
    }

    /// Let actor mailboxes drain between virtual-time steps.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    /// Advance virtual time and drain mailboxes.
    pub async fn advance(&self, millis: u64) {
        self.clock.advance(millis);
        self.settle().await;
    }
}

pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl EventStream {
    /// All events received so far.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// First drained event matching `pick`, discarding everything before
    /// it.
    pub fn find<T>(&mut self, pick: impl Fn(&ServerEvent) -> Option<T>) -> Option<T> {
        while let Ok(event) = self.rx.try_recv() {
            if let Some(found) = pick(&event) {
                return Some(found);
            }
        }
        None
    }
}

/// Heads-up variant with 100-chip stacks and 1/2 blinds.
pub fn heads_up_100() -> Variant {
    let mut variant = Variant::heads_up();
    variant.starting_stack = 100;
    variant
}
