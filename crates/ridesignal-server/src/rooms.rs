//! Ephemeral room membership (private-chat pairs).

use std::collections::HashSet;

use dashmap::DashMap;
use ridesignal_core::{ConnectionId, Frame, RoomId};

use crate::connection::Outbox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    /// The connection has no membership slot (never opened, or already torn down).
    UnknownConnection,
}

/// Room → members plus connection → rooms.
///
/// A connection can only join while its membership slot exists: `open`
/// creates it, `leave_all` removes it. Lock order is `joined` then `rooms`.
#[derive(Default)]
pub struct RoomManager {
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    joined: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the membership slot for a freshly connected connection.
    pub fn open(&self, connection: &ConnectionId) {
        self.joined.entry(connection.clone()).or_default();
    }

    pub fn join(&self, connection: &ConnectionId, room: &RoomId) -> JoinOutcome {
        let Some(mut joined) = self.joined.get_mut(connection) else {
            return JoinOutcome::UnknownConnection;
        };
        if !joined.insert(room.clone()) {
            return JoinOutcome::AlreadyMember;
        }
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(connection.clone());
        JoinOutcome::Joined
    }

    /// Returns whether the connection was a member.
    pub fn leave(&self, connection: &ConnectionId, room: &RoomId) -> bool {
        let Some(mut joined) = self.joined.get_mut(connection) else {
            return false;
        };
        if !joined.remove(room) {
            return false;
        }
        self.remove_member(room, connection);
        true
    }

    /// Leave every room and drop the membership slot. Returns the rooms left.
    pub fn leave_all(&self, connection: &ConnectionId) -> Vec<RoomId> {
        let Some((_, joined)) = self.joined.remove(connection) else {
            return Vec::new();
        };
        let mut left: Vec<RoomId> = joined.into_iter().collect();
        for room in &left {
            self.remove_member(room, connection);
        }
        left.sort();
        left
    }

    fn remove_member(&self, room: &RoomId, connection: &ConnectionId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(connection);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    /// Snapshot of a room's members.
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection currently belongs to, sorted.
    pub fn rooms_of(&self, connection: &ConnectionId) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .joined
            .get(connection)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub fn is_member(&self, connection: &ConnectionId, room: &RoomId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|m| m.contains(connection))
    }

    /// Rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Deliver `frame` to every current member. An empty room is not an error.
    pub fn broadcast(&self, room: &RoomId, frame: &Frame, outbox: &impl Outbox) -> usize {
        let members = self.members(room);
        if members.is_empty() {
            tracing::debug!(room_id = %room, "Broadcast to empty room");
            return 0;
        }
        members
            .iter()
            .filter(|member| outbox.deliver(member, frame).is_queued())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Delivery;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingOutbox {
        sent: Mutex<Vec<(ConnectionId, String)>>,
    }

    impl Outbox for RecordingOutbox {
        fn deliver(&self, to: &ConnectionId, frame: &Frame) -> Delivery {
            self.sent.lock().push((to.clone(), frame.to_string()));
            Delivery::Queued
        }
    }

    fn opened(rooms: &RoomManager) -> ConnectionId {
        let id = ConnectionId::new();
        rooms.open(&id);
        id
    }

    fn room(name: &str) -> RoomId {
        RoomId::from_raw(name)
    }

    #[test]
    fn join_is_idempotent() {
        let rooms = RoomManager::new();
        let c = opened(&rooms);
        assert_eq!(rooms.join(&c, &room("r")), JoinOutcome::Joined);
        assert_eq!(rooms.join(&c, &room("r")), JoinOutcome::AlreadyMember);
        assert_eq!(rooms.members(&room("r")), vec![c.clone()]);
        assert_eq!(rooms.rooms_of(&c), vec![room("r")]);
    }

    #[test]
    fn join_requires_open_slot() {
        let rooms = RoomManager::new();
        let stranger = ConnectionId::new();
        assert_eq!(rooms.join(&stranger, &room("r")), JoinOutcome::UnknownConnection);
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn leave_drains_and_reclaims_room() {
        let rooms = RoomManager::new();
        let a = opened(&rooms);
        let b = opened(&rooms);
        rooms.join(&a, &room("r"));
        rooms.join(&b, &room("r"));

        assert!(rooms.leave(&a, &room("r")));
        assert!(!rooms.leave(&a, &room("r")));
        assert_eq!(rooms.members(&room("r")), vec![b.clone()]);

        assert!(rooms.leave(&b, &room("r")));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn leave_all_clears_every_membership() {
        let rooms = RoomManager::new();
        let a = opened(&rooms);
        let b = opened(&rooms);
        rooms.join(&a, &room("r1"));
        rooms.join(&a, &room("r2"));
        rooms.join(&b, &room("r2"));

        assert_eq!(rooms.leave_all(&a), vec![room("r1"), room("r2")]);
        assert!(rooms.rooms_of(&a).is_empty());
        assert!(!rooms.is_member(&a, &room("r2")));
        assert!(rooms.is_member(&b, &room("r2")));
        assert_eq!(rooms.room_count(), 1);

        // Slot is gone: late joins are refused, repeat teardown is a no-op.
        assert_eq!(rooms.join(&a, &room("r3")), JoinOutcome::UnknownConnection);
        assert!(rooms.leave_all(&a).is_empty());
    }

    #[test]
    fn broadcast_reaches_exactly_members() {
        let rooms = RoomManager::new();
        let a = opened(&rooms);
        let b = opened(&rooms);
        let outsider = opened(&rooms);
        rooms.join(&a, &room("r"));
        rooms.join(&b, &room("r"));
        rooms.join(&outsider, &room("other"));

        let outbox = RecordingOutbox::default();
        let frame: Frame = Arc::from("hi");
        assert_eq!(rooms.broadcast(&room("r"), &frame, &outbox), 2);

        let mut recipients: Vec<ConnectionId> =
            outbox.sent.lock().iter().map(|(c, _)| c.clone()).collect();
        recipients.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(recipients, expected);
    }

    #[test]
    fn broadcast_to_empty_room_is_silent() {
        let rooms = RoomManager::new();
        let outbox = RecordingOutbox::default();
        assert_eq!(rooms.broadcast(&room("nobody"), &Arc::from("x"), &outbox), 0);
        assert!(outbox.sent.lock().is_empty());
    }

    #[test]
    fn concurrent_join_and_teardown_leave_no_dangling_member() {
        for _ in 0..200 {
            let rooms = Arc::new(RoomManager::new());
            let peer = opened(&rooms);
            let r = room("alice_bob");

            let joiner = {
                let rooms = Arc::clone(&rooms);
                let (peer, r) = (peer.clone(), r.clone());
                std::thread::spawn(move || rooms.join(&peer, &r))
            };
            let teardown = {
                let rooms = Arc::clone(&rooms);
                let peer = peer.clone();
                std::thread::spawn(move || rooms.leave_all(&peer))
            };
            joiner.join().unwrap();
            teardown.join().unwrap();

            assert!(!rooms.is_member(&peer, &r));
            assert_eq!(rooms.room_count(), 0);
        }
    }
}
