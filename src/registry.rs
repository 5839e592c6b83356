//! Room membership registry
//!
//! Explicit mapping from room identifier to the set of member connections,
//! with a reverse index for O(1) "which room is this connection in" lookups.
//! A connection belongs to at most one room at a time. The hub actor is the
//! sole writer, so no internal synchronization is needed.
//!
//! Rooms are never created or destroyed explicitly: a room entry exists
//! exactly while it has at least one member.

use std::collections::{HashMap, HashSet};

use crate::types::{ConnId, RoomId};

/// Room → members mapping with a connection → room reverse index
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Members of each room
    members: HashMap<RoomId, HashSet<ConnId>>,
    /// Current room of each joined connection
    rooms_by_conn: HashMap<ConnId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a connection into `room`, leaving its previous room if any
    ///
    /// Returns the room the connection was in before, or `None` if it was
    /// unjoined. Joining the room it is already in is a no-op membership-wise
    /// but still reports the previous room.
    pub fn join(&mut self, conn: ConnId, room: RoomId) -> Option<RoomId> {
        let previous = self.leave(conn);
        self.members.entry(room.clone()).or_default().insert(conn);
        self.rooms_by_conn.insert(conn, room);
        previous
    }

    /// Remove a connection from its current room, if it has one
    ///
    /// Empty rooms are dropped from the map. Returns the room left.
    pub fn leave(&mut self, conn: ConnId) -> Option<RoomId> {
        let room = self.rooms_by_conn.remove(&conn)?;
        if let Some(members) = self.members.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                self.members.remove(&room);
            }
        }
        Some(room)
    }

    /// The room a connection currently belongs to
    pub fn room_of(&self, conn: ConnId) -> Option<&RoomId> {
        self.rooms_by_conn.get(&conn)
    }

    /// Current members of a room (empty iterator for unknown rooms)
    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = ConnId> + '_ {
        self.members.get(room).into_iter().flatten().copied()
    }

    /// Number of members in a room
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.members.get(room).map_or(0, HashSet::len)
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(s: &str) -> RoomId {
        RoomId::parse(s).unwrap()
    }

    #[test]
    fn test_join_and_lookup() {
        let mut reg = RoomRegistry::new();
        let a = ConnId::new();
        let b = ConnId::new();

        assert_eq!(reg.join(a, room("abc123")), None);
        assert_eq!(reg.join(b, room("abc123")), None);

        assert_eq!(reg.room_of(a), Some(&room("abc123")));
        assert_eq!(reg.member_count(&room("abc123")), 2);
        assert_eq!(reg.room_count(), 1);

        let members: HashSet<_> = reg.members(&room("abc123")).collect();
        assert!(members.contains(&a));
        assert!(members.contains(&b));
    }

    #[test]
    fn test_switch_room_leaves_previous() {
        let mut reg = RoomRegistry::new();
        let a = ConnId::new();

        reg.join(a, room("abc123"));
        let previous = reg.join(a, room("xyz789"));

        assert_eq!(previous, Some(room("abc123")));
        assert_eq!(reg.room_of(a), Some(&room("xyz789")));
        assert_eq!(reg.member_count(&room("abc123")), 0);
        // Emptied room entry is gone entirely
        assert_eq!(reg.room_count(), 1);
    }

    #[test]
    fn test_leave_drops_empty_room() {
        let mut reg = RoomRegistry::new();
        let a = ConnId::new();
        let b = ConnId::new();

        reg.join(a, room("abc123"));
        reg.join(b, room("abc123"));

        assert_eq!(reg.leave(a), Some(room("abc123")));
        assert_eq!(reg.room_count(), 1);
        assert_eq!(reg.leave(b), Some(room("abc123")));
        assert_eq!(reg.room_count(), 0);
    }

    #[test]
    fn test_leave_when_unjoined() {
        let mut reg = RoomRegistry::new();
        assert_eq!(reg.leave(ConnId::new()), None);
    }

    #[test]
    fn test_rooms_are_isolated() {
        let mut reg = RoomRegistry::new();
        let a = ConnId::new();
        let b = ConnId::new();

        reg.join(a, room("abc123"));
        reg.join(b, room("xyz789"));

        let members: Vec<_> = reg.members(&room("abc123")).collect();
        assert_eq!(members, vec![a]);
        let members: Vec<_> = reg.members(&room("xyz789")).collect();
        assert_eq!(members, vec![b]);
    }
}
