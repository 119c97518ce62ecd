//! Room directory: room id -> member set + bounded message log
//!
//! Rooms are created lazily on first reference and torn down when the last
//! member leaves. Membership and the per-room logs live behind one lock, so
//! concurrent appends to the same room serialize and the occupancy index
//! (connection -> room) can never disagree with the member sets.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::current_timestamp;
use crate::error::{RelayError, Result};
use crate::protocol::events::{Message, RoomId};
use crate::server::buffer::MessageBuffer;
use crate::transport::ConnectionId;

/// A named broadcast group
#[derive(Debug)]
struct Room {
    /// Set once when the room is first referenced, kept accurate thereafter
    created_at: u64,
    members: HashSet<ConnectionId>,
    log: MessageBuffer,
}

impl Room {
    fn new(message_capacity: usize) -> Self {
        Self {
            created_at: current_timestamp(),
            members: HashSet::new(),
            log: MessageBuffer::new(message_capacity),
        }
    }
}

#[derive(Default)]
struct DirectoryInner {
    rooms: HashMap<RoomId, Room>,
    /// connection -> occupied room; a connection occupies at most one room
    occupancy: HashMap<ConnectionId, RoomId>,
}

/// Directory of all live rooms
pub struct RoomDirectory {
    inner: RwLock<DirectoryInner>,
    message_capacity: usize,
    /// Keep the log (and created_at) when a room empties instead of
    /// dropping the whole record. Default is to drop.
    retain_empty_room_log: bool,
}

impl RoomDirectory {
    pub fn new(message_capacity: usize, retain_empty_room_log: bool) -> Self {
        Self {
            inner: RwLock::new(DirectoryInner::default()),
            message_capacity,
            retain_empty_room_log,
        }
    }

    /// Create the room if it does not exist yet. Idempotent: an existing
    /// room keeps its creation timestamp, members, and log.
    pub async fn ensure_room(&self, room_id: &str) {
        let mut inner = self.inner.write().await;
        if !inner.rooms.contains_key(room_id) {
            inner
                .rooms
                .insert(room_id.to_string(), Room::new(self.message_capacity));
            info!("created room {}", room_id);
        }
    }

    /// Add a connection to a room's member set.
    ///
    /// Returns `Ok(true)` on a fresh join, `Ok(false)` when the connection
    /// is already a member of this room (idempotent success), and
    /// `AlreadyInRoom` when it occupies a different room — the caller must
    /// leave first.
    pub async fn join(&self, room_id: &str, id: ConnectionId) -> Result<bool> {
        let mut inner = self.inner.write().await;

        match inner.occupancy.get(&id) {
            Some(current) if current == room_id => return Ok(false),
            Some(current) => {
                return Err(RelayError::already_in_room(format!(
                    "connection occupies room {}",
                    current
                )));
            }
            None => {}
        }

        let room = inner
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RelayError::not_found(format!("unknown room {}", room_id)))?;
        room.members.insert(id);
        inner.occupancy.insert(id, room_id.to_string());

        debug!("{} joined room {}", id, room_id);
        Ok(true)
    }

    /// Remove a connection from a room. Returns false when it was not a
    /// member. An emptied room's membership record is torn down; the log
    /// goes with it unless the directory retains empty-room logs.
    pub async fn leave(&self, room_id: &str, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        Self::leave_locked(&mut inner, room_id, id, self.retain_empty_room_log)
    }

    /// Remove a connection from whatever room it occupies
    pub async fn leave_current(&self, id: ConnectionId) -> Option<RoomId> {
        let mut inner = self.inner.write().await;
        let room_id = inner.occupancy.get(&id).cloned()?;
        Self::leave_locked(&mut inner, &room_id, id, self.retain_empty_room_log);
        Some(room_id)
    }

    fn leave_locked(
        inner: &mut DirectoryInner,
        room_id: &str,
        id: ConnectionId,
        retain_log: bool,
    ) -> bool {
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return false;
        };
        if !room.members.remove(&id) {
            return false;
        }
        inner.occupancy.remove(&id);

        if room.members.is_empty() && !retain_log {
            inner.rooms.remove(room_id);
            info!("room {} empty, dropped", room_id);
        }
        true
    }

    /// The room a connection currently occupies
    pub async fn room_of(&self, id: ConnectionId) -> Option<RoomId> {
        self.inner.read().await.occupancy.get(&id).cloned()
    }

    /// Snapshot of a room's member connections (empty when unknown)
    pub async fn member_ids(&self, room_id: &str) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// room id -> member count, occupied rooms only
    pub async fn room_summaries(&self) -> BTreeMap<RoomId, usize> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .iter()
            .filter(|(_, room)| !room.members.is_empty())
            .map(|(id, room)| (id.clone(), room.members.len()))
            .collect()
    }

    /// Creation timestamp of a room, if it exists
    pub async fn created_at(&self, room_id: &str) -> Option<u64> {
        self.inner.read().await.rooms.get(room_id).map(|r| r.created_at)
    }

    /// Append a message to a room's log. Returns false when the room does
    /// not exist; logs are only written for live rooms.
    pub async fn append(&self, room_id: &str, message: Message) -> bool {
        let mut inner = self.inner.write().await;
        match inner.rooms.get_mut(room_id) {
            Some(room) => {
                room.log.push(message);
                true
            }
            None => {
                debug!("append to unknown room {}", room_id);
                false
            }
        }
    }

    /// Most recent `limit` messages of a room, oldest-first
    pub async fn tail(&self, room_id: &str, limit: usize) -> Vec<Message> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.log.tail(limit))
            .unwrap_or_default()
    }

    /// Number of live room records
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
