//! Room-based event fan-out.
//!
//! Rooms are named channels (one per table, one per tournament, one per
//! queue). Publishing iterates a room's members synchronously, so events
//! published by a single-writer actor arrive at every member in the order
//! the actor produced them. Across rooms no ordering is implied.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::connection::{ConnId, ConnectionRegistry, EventSender};
use crate::game::entities::{TableId, TournamentId, UserId};
use crate::net::ServerEvent;

struct RoomMember {
    conn_id: ConnId,
    user_id: UserId,
    sender: EventSender,
}

#[derive(Default)]
pub struct Broadcaster {
    rooms: RwLock<HashMap<String, Vec<RoomMember>>>,
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table_room(table_id: TableId) -> String {
        format!("table:{table_id}")
    }

    #[must_use]
    pub fn tournament_room(tournament_id: TournamentId) -> String {
        format!("tournament:{tournament_id}")
    }

    #[must_use]
    pub fn queue_room(slug: &str) -> String {
        format!("queue:{slug}")
    }

    /// Subscribe one socket to a room. Idempotent per connection.
    pub fn join_room(&self, room: &str, conn_id: ConnId, user_id: UserId, sender: EventSender) {
        let mut rooms = self.rooms.write().expect("broadcaster poisoned");
        let members = rooms.entry(room.to_string()).or_default();
        if members.iter().any(|m| m.conn_id == conn_id) {
            return;
        }
        members.push(RoomMember {
            conn_id,
            user_id,
            sender,
        });
    }

    /// Subscribe every live socket a user holds, via the registry. Used
    /// when the server moves a player between rooms on their behalf.
    pub fn join_room_user(&self, registry: &ConnectionRegistry, room: &str, user_id: UserId) {
        for (conn_id, sender) in registry.senders_for(user_id) {
            self.join_room(room, conn_id, user_id, sender);
        }
    }

    pub fn leave_room(&self, room: &str, conn_id: ConnId) {
        let mut rooms = self.rooms.write().expect("broadcaster poisoned");
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|m| m.conn_id != conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Remove a user's sockets from one room.
    pub fn leave_room_user(&self, room: &str, user_id: UserId) {
        let mut rooms = self.rooms.write().expect("broadcaster poisoned");
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|m| m.user_id != user_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Remove a closed socket from every room.
    pub fn leave_all(&self, conn_id: ConnId) {
        let mut rooms = self.rooms.write().expect("broadcaster poisoned");
        rooms.retain(|_, members| {
            members.retain(|m| m.conn_id != conn_id);
            !members.is_empty()
        });
    }

    /// Publish one event to every member of a room.
    pub fn publish(&self, room: &str, event: &ServerEvent) {
        let rooms = self.rooms.read().expect("broadcaster poisoned");
        if let Some(members) = rooms.get(room) {
            for member in members {
                let _ = member.sender.send(event.clone());
            }
        }
    }

    /// Publish a per-viewer event built by `build`, called once per member
    /// with that member's user id. Used for snapshots with masked hole
    /// cards.
    pub fn publish_each<F>(&self, room: &str, build: F)
    where
        F: Fn(UserId) -> ServerEvent,
    {
        let rooms = self.rooms.read().expect("broadcaster poisoned");
        if let Some(members) = rooms.get(room) {
            for member in members {
                let _ = member.sender.send(build(member.user_id));
            }
        }
    }

    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms
            .read()
            .expect("broadcaster poisoned")
            .get(room)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn member() -> (EventSender, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn publish_preserves_order_per_room() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = member();
        broadcaster.join_room("table:1", 1, 10, tx);
        for i in 0..5 {
            broadcaster.publish("table:1", &ServerEvent::error(format!("e{i}")));
        }
        for i in 0..5 {
            match rx.try_recv().unwrap() {
                ServerEvent::Error { message } => assert_eq!(message, format!("e{i}")),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn join_room_is_idempotent_per_conn() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = member();
        broadcaster.join_room("table:1", 1, 10, tx.clone());
        broadcaster.join_room("table:1", 1, 10, tx);
        broadcaster.publish("table:1", &ServerEvent::error("once"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn leave_all_removes_conn_from_every_room() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = member();
        broadcaster.join_room("table:1", 1, 10, tx.clone());
        broadcaster.join_room("tournament:2", 1, 10, tx);
        broadcaster.leave_all(1);
        broadcaster.publish("table:1", &ServerEvent::error("x"));
        broadcaster.publish("tournament:2", &ServerEvent::error("y"));
        assert!(rx.try_recv().is_err());
        assert_eq!(broadcaster.member_count("table:1"), 0);
    }

    #[test]
    fn publish_each_personalizes_by_user() {
        let broadcaster = Broadcaster::new();
        let (tx_a, mut rx_a) = member();
        let (tx_b, mut rx_b) = member();
        broadcaster.join_room("table:1", 1, 100, tx_a);
        broadcaster.join_room("table:1", 2, 200, tx_b);
        broadcaster.publish_each("table:1", |user| ServerEvent::error(format!("for {user}")));
        match rx_a.try_recv().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "for 100"),
            other => panic!("unexpected event {other:?}"),
        }
        match rx_b.try_recv().unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "for 200"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_do_not_cross_rooms() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = member();
        broadcaster.join_room("table:1", 1, 10, tx);
        broadcaster.publish("table:2", &ServerEvent::error("elsewhere"));
        assert!(rx.try_recv().is_err());
    }
}
