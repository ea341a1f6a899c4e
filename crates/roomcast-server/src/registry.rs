use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;

/// Opaque, comparable identity for one connected client. Distinct from
/// any transport address; allocated by the registry.
pub type ConnectionId = u64;

/// Per-member sender for outbound text frames.
/// Bounded so a stalled client can never block the broadcaster.
/// `Utf8Bytes` gives zero-copy cloning when fanning out to a room.
pub type MemberSender = mpsc::Sender<Utf8Bytes>;

/// Why a send to a member failed during broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The member's outbound channel is full (client is stalled).
    Backpressured,
    /// The member's writer task is gone (socket closed).
    Disconnected,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backpressured => write!(f, "member channel full"),
            Self::Disconnected => write!(f, "member channel closed"),
        }
    }
}

/// The send half of one member's connection.
struct MemberHandle {
    sender: MemberSender,
}

impl MemberHandle {
    fn send(&self, frame: Utf8Bytes) -> Result<(), SendError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Backpressured,
            mpsc::error::TrySendError::Closed(_) => SendError::Disconnected,
        })
    }
}

struct RoomEntry {
    members: HashMap<ConnectionId, MemberHandle>,
}

/// Single source of truth for which connections belong to which room.
/// The only component that iterates or mutates a room's member set.
///
/// Shared behind an async `RwLock`; `broadcast` takes `&mut self`, so
/// broadcasts to the same room are serialized by the write lock and no
/// two broadcasts can interleave their per-member sends.
pub struct RoomRegistry {
    rooms: HashMap<String, RoomEntry>,
    next_connection_id: ConnectionId,
    max_rooms: usize,
}

impl RoomRegistry {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            next_connection_id: 1,
            max_rooms,
        }
    }

    pub fn alloc_connection_id(&mut self) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        id
    }

    /// Add a member to the named room, creating the room on first join.
    /// Idempotent: joining a room the member is already in is a no-op.
    pub fn join(
        &mut self,
        room_id: &str,
        conn_id: ConnectionId,
        sender: MemberSender,
    ) -> Result<(), String> {
        if !self.rooms.contains_key(room_id) && self.rooms.len() >= self.max_rooms {
            return Err("Room limit reached".to_string());
        }
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomEntry {
                members: HashMap::new(),
            });
        entry
            .members
            .entry(conn_id)
            .or_insert(MemberHandle { sender });
        Ok(())
    }

    /// Remove a member from the room if present; no-op if absent.
    /// The room entry is destroyed once its member set becomes empty.
    /// Returns whether a member was actually removed.
    pub fn leave(&mut self, room_id: &str, conn_id: ConnectionId) -> bool {
        let Some(entry) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let removed = entry.members.remove(&conn_id).is_some();
        if entry.members.is_empty() {
            self.rooms.remove(room_id);
            tracing::debug!(room = room_id, "Room destroyed (empty)");
        }
        removed
    }

    /// Deliver a frame to every current member of the room.
    ///
    /// Snapshot-then-prune: the member set is snapshotted before any send,
    /// so the set iterated is never mutated mid-iteration. Members whose
    /// send fails are removed from the room afterwards; one member's
    /// transport failure never aborts delivery to the rest and never
    /// escapes this method. Broadcasting to an unknown or empty room is a
    /// no-op. Returns the count of successful deliveries.
    pub fn broadcast(&mut self, room_id: &str, frame: Utf8Bytes) -> usize {
        let Some(entry) = self.rooms.get(room_id) else {
            return 0;
        };

        let snapshot: Vec<(ConnectionId, MemberSender)> = entry
            .members
            .iter()
            .map(|(&id, member)| (id, member.sender.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed: Vec<(ConnectionId, SendError)> = Vec::new();
        for (conn_id, sender) in snapshot {
            let handle = MemberHandle { sender };
            match handle.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((conn_id, e)),
            }
        }

        for (conn_id, error) in failed {
            self.leave(room_id, conn_id);
            tracing::debug!(
                conn_id,
                room = room_id,
                %error,
                "Pruned member after failed send"
            );
        }

        delivered
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |e| e.members.len())
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// (active rooms, total members across all rooms) for health reporting.
    pub fn stats(&self) -> (usize, usize) {
        let members: usize = self.rooms.values().map(|e| e.members.len()).sum();
        (self.rooms.len(), members)
    }
}
