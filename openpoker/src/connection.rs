//! Connection registry: the only component that touches the transport.
//!
//! Maps a user to zero or more live sockets and tracks presence plus
//! last-seen timestamps. Actors read it to push events; only the transport
//! layer registers and deregisters sockets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::game::entities::{UnixMillis, UserId};
use crate::net::ServerEvent;

/// Socket identifier, unique per process.
pub type ConnId = u64;

/// Sending half of one socket's outbound event stream.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
struct UserEntry {
    sockets: Vec<(ConnId, EventSender)>,
    last_seen: UnixMillis,
}

pub struct ConnectionRegistry {
    clock: Arc<dyn Clock>,
    users: RwLock<HashMap<UserId, UserEntry>>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            users: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a new socket for `user_id`. Returns the connection id, the
    /// event receiver the transport drains, and a sender handle for room
    /// subscriptions.
    pub fn register(
        &self,
        user_id: UserId,
    ) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>, EventSender) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut users = self.users.write().expect("registry poisoned");
        let entry = users.entry(user_id).or_default();
        entry.sockets.push((conn_id, tx.clone()));
        entry.last_seen = self.clock.now_millis();
        log::debug!("user {user_id} connected (conn {conn_id})");
        (conn_id, rx, tx)
    }

    /// Deregister a socket. Returns `true` when this was the user's last
    /// live socket, which is the table-facing disconnect signal.
    pub fn deregister(&self, user_id: UserId, conn_id: ConnId) -> bool {
        let mut users = self.users.write().expect("registry poisoned");
        let Some(entry) = users.get_mut(&user_id) else {
            return false;
        };
        entry.sockets.retain(|(id, _)| *id != conn_id);
        entry.last_seen = self.clock.now_millis();
        if entry.sockets.is_empty() {
            users.remove(&user_id);
            log::debug!("user {user_id} fully disconnected");
            return true;
        }
        false
    }

    /// Refresh the user's last-seen timestamp.
    pub fn touch(&self, user_id: UserId) {
        if let Some(entry) = self.users.write().expect("registry poisoned").get_mut(&user_id) {
            entry.last_seen = self.clock.now_millis();
        }
    }

    #[must_use]
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.users
            .read()
            .expect("registry poisoned")
            .get(&user_id)
            .is_some_and(|e| !e.sockets.is_empty())
    }

    #[must_use]
    pub fn last_seen(&self, user_id: UserId) -> Option<UnixMillis> {
        self.users
            .read()
            .expect("registry poisoned")
            .get(&user_id)
            .map(|e| e.last_seen)
    }

    /// Deliver an event to every socket the user holds.
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) {
        let users = self.users.read().expect("registry poisoned");
        if let Some(entry) = users.get(&user_id) {
            for (_, sender) in &entry.sockets {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Live socket senders for a user, for room membership changes made on
    /// the user's behalf (for example tournament table transfers).
    #[must_use]
    pub fn senders_for(&self, user_id: UserId) -> Vec<(ConnId, EventSender)> {
        self.users
            .read()
            .expect("registry poisoned")
            .get(&user_id)
            .map(|e| e.sockets.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;

    fn registry() -> (Arc<VirtualClock>, ConnectionRegistry) {
        let clock = Arc::new(VirtualClock::new(1_000));
        (Arc::clone(&clock), ConnectionRegistry::new(clock))
    }

    #[test]
    fn last_socket_close_reports_offline() {
        let (_, registry) = registry();
        let (a, _rx_a, _) = registry.register(1);
        let (b, _rx_b, _) = registry.register(1);
        assert!(registry.is_online(1));
        assert!(!registry.deregister(1, a));
        assert!(registry.is_online(1));
        assert!(registry.deregister(1, b));
        assert!(!registry.is_online(1));
    }

    #[test]
    fn send_reaches_every_socket() {
        let (_, registry) = registry();
        let (_, mut rx_a, _) = registry.register(1);
        let (_, mut rx_b, _) = registry.register(1);
        registry.send_to_user(1, &ServerEvent::error("ping"));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn send_to_unknown_user_is_a_noop() {
        let (_, registry) = registry();
        registry.send_to_user(42, &ServerEvent::error("nobody home"));
    }

    #[test]
    fn last_seen_tracks_clock() {
        let (clock, registry) = registry();
        let (conn, _rx, _) = registry.register(1);
        assert_eq!(registry.last_seen(1), Some(1_000));
        clock.advance(500);
        registry.touch(1);
        assert_eq!(registry.last_seen(1), Some(1_500));
        registry.deregister(1, conn);
        assert_eq!(registry.last_seen(1), None);
    }

    #[test]
    fn deregister_unknown_conn_is_safe() {
        let (_, registry) = registry();
        assert!(!registry.deregister(9, 9));
        let (conn, _rx, _) = registry.register(9);
        assert!(!registry.deregister(9, conn + 100));
        assert!(registry.deregister(9, conn));
    }
}
