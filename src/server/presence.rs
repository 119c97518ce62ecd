//! Presence registry: connection identity, display name, current room
//!
//! Owns every [`Participant`] exclusively. The display-name index lives in
//! the same lock as the participant map, so name reservation is atomic with
//! insertion: under concurrent registrations for the same name exactly one
//! can win.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::current_timestamp;
use crate::error::{RelayError, Result};
use crate::protocol::events::{ParticipantInfo, RoomId};
use crate::server::rooms::RoomDirectory;
use crate::transport::ConnectionId;

/// Chat-facing identity bound to a connection
#[derive(Debug, Clone)]
pub struct Participant {
    /// Connection handle, primary key
    pub id: ConnectionId,
    /// Verified user id from the authenticator, when one was consulted
    pub user_id: Option<String>,
    /// Display name, globally unique while connected
    pub username: String,
    /// Room the connection currently occupies, at most one
    pub current_room: Option<RoomId>,
    /// Typing indicator state
    pub is_typing: bool,
    /// When the participant registered
    pub joined_at: u64,
    /// Last inbound activity
    pub last_activity: u64,
}

impl Participant {
    fn new(id: ConnectionId, username: String, user_id: Option<String>) -> Self {
        let now = current_timestamp();
        Self {
            id,
            user_id,
            username,
            current_room: None,
            is_typing: false,
            joined_at: now,
            last_activity: now,
        }
    }

    /// Wire view of this participant
    pub fn to_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            username: self.username.clone(),
            joined_at: self.joined_at,
            is_typing: self.is_typing,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    /// connection -> participant
    participants: HashMap<ConnectionId, Participant>,
    /// display name -> connection, for the uniqueness check
    names: HashMap<String, ConnectionId>,
}

/// Registry of all live participants
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a participant, reserving its display name.
    ///
    /// Name reservation and insertion happen under one write lock; there is
    /// no window where two concurrent registrations can both succeed.
    pub async fn register(
        &self,
        id: ConnectionId,
        username: String,
        user_id: Option<String>,
    ) -> Result<Participant> {
        let mut inner = self.inner.write().await;

        if inner.names.contains_key(&username) {
            return Err(RelayError::name_taken("Username already taken"));
        }
        if inner.participants.contains_key(&id) {
            return Err(RelayError::internal(format!(
                "connection {} already registered",
                id
            )));
        }

        let participant = Participant::new(id, username.clone(), user_id);
        inner.names.insert(username.clone(), id);
        inner.participants.insert(id, participant.clone());

        info!("registered {} as {}", id, username);
        Ok(participant)
    }

    /// Remove a participant, leaving its room first.
    ///
    /// The directory leave runs while the registry write lock is held, so
    /// there is no window where the name is free but the participant is
    /// still counted as a room member. Lock order is always registry then
    /// directory; the directory never takes registry locks.
    pub async fn unregister(
        &self,
        rooms: &RoomDirectory,
        id: ConnectionId,
    ) -> Result<Participant> {
        let mut inner = self.inner.write().await;

        let mut participant = inner
            .participants
            .get(&id)
            .cloned()
            .ok_or_else(|| RelayError::not_found(format!("unknown connection {}", id)))?;

        // Always consult the directory, not just the snapshot: a join that
        // has entered the member set but not yet recorded `current_room`
        // would otherwise leave an orphaned membership record behind.
        let left = rooms.leave_current(id).await;
        if participant.current_room.is_none() {
            participant.current_room = left;
        }

        inner.participants.remove(&id);
        inner.names.remove(&participant.username);

        info!("unregistered {} ({})", participant.username, id);
        Ok(participant)
    }

    /// Look up a participant by connection (copy-out snapshot)
    pub async fn lookup(&self, id: ConnectionId) -> Result<Participant> {
        let inner = self.inner.read().await;
        inner
            .participants
            .get(&id)
            .cloned()
            .ok_or_else(|| RelayError::not_found(format!("unknown connection {}", id)))
    }

    /// Whether a display name is free
    pub async fn is_name_available(&self, username: &str) -> bool {
        let inner = self.inner.read().await;
        !inner.names.contains_key(username)
    }

    /// Update a participant's last-activity timestamp.
    /// Returns false (not an error) when the connection is unknown.
    pub async fn touch_activity(&self, id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        match inner.participants.get_mut(&id) {
            Some(p) => {
                p.last_activity = current_timestamp();
                true
            }
            None => {
                debug!("touch_activity for unknown connection {}", id);
                false
            }
        }
    }

    /// Set the typing flag. Returns false when the connection is unknown.
    pub async fn set_typing(&self, id: ConnectionId, is_typing: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.participants.get_mut(&id) {
            Some(p) => {
                p.is_typing = is_typing;
                p.last_activity = current_timestamp();
                true
            }
            None => {
                debug!("set_typing for unknown connection {}", id);
                false
            }
        }
    }

    /// Record which room the participant occupies. Kept in lockstep with the
    /// directory's member sets by the coordinator.
    pub async fn set_room(&self, id: ConnectionId, room: Option<RoomId>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.participants.get_mut(&id) {
            Some(p) => {
                p.current_room = room;
                true
            }
            None => {
                debug!("set_room for unknown connection {}", id);
                false
            }
        }
    }

    /// Snapshot of every live participant
    pub async fn list_all(&self) -> Vec<Participant> {
        let inner = self.inner.read().await;
        inner.participants.values().cloned().collect()
    }

    /// Participants with no activity for at least `idle_for`
    pub async fn list_idle(&self, idle_for: Duration) -> Vec<Participant> {
        let cutoff = current_timestamp().saturating_sub(idle_for.as_millis() as u64);
        let inner = self.inner.read().await;
        inner
            .participants
            .values()
            .filter(|p| p.last_activity < cutoff)
            .cloned()
            .collect()
    }

    /// Number of live participants
    pub async fn len(&self) -> usize {
        self.inner.read().await.participants.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.participants.is_empty()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn directory() -> RoomDirectory {
        RoomDirectory::new(100, false)
    }

    #[tokio::test]
    async fn test_register_reserves_name() {
        let registry = PresenceRegistry::new();
        assert!(registry.is_name_available("alice").await);

        let p = registry
            .register(ConnectionId::new(), "alice".to_string(), None)
            .await
            .unwrap();
        assert_eq!(p.username, "alice");
        assert!(p.current_room.is_none());
        assert!(!registry.is_name_available("alice").await);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let registry = PresenceRegistry::new();
        registry
            .register(ConnectionId::new(), "alice".to_string(), None)
            .await
            .unwrap();

        let err = registry
            .register(ConnectionId::new(), "alice".to_string(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "USERNAME_TAKEN");
    }

    #[tokio::test]
    async fn test_concurrent_registrations_one_winner() {
        let registry = Arc::new(PresenceRegistry::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .register(ConnectionId::new(), "alice".to_string(), None)
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_frees_name_and_membership() {
        let registry = PresenceRegistry::new();
        let rooms = directory();
        let conn = ConnectionId::new();

        registry
            .register(conn, "alice".to_string(), None)
            .await
            .unwrap();
        rooms.ensure_room("general").await;
        rooms.join("general", conn).await.unwrap();
        registry
            .set_room(conn, Some("general".to_string()))
            .await;

        let removed = registry.unregister(&rooms, conn).await.unwrap();
        assert_eq!(removed.current_room.as_deref(), Some("general"));

        assert!(registry.is_name_available("alice").await);
        assert!(!rooms.member_ids("general").await.contains(&conn));
        assert!(registry.lookup(conn).await.is_err());
    }

    #[tokio::test]
    async fn test_unregister_during_join_window_leaves_no_membership() {
        let registry = PresenceRegistry::new();
        let rooms = directory();
        let conn = ConnectionId::new();

        registry
            .register(conn, "alice".to_string(), None)
            .await
            .unwrap();
        rooms.ensure_room("general").await;
        // A join that made it into the member set but has not recorded
        // the room on the participant yet
        rooms.join("general", conn).await.unwrap();

        let removed = registry.unregister(&rooms, conn).await.unwrap();

        assert!(rooms.member_ids("general").await.is_empty());
        assert!(rooms.room_summaries().await.is_empty());
        assert!(registry.is_name_available("alice").await);
        // The membership the directory knew about is reported back
        assert_eq!(removed.current_room.as_deref(), Some("general"));
    }

    #[tokio::test]
    async fn test_unregister_unknown_connection() {
        let registry = PresenceRegistry::new();
        let rooms = directory();
        let err = registry
            .unregister(&rooms, ConnectionId::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_touch_and_typing_unknown_are_noops() {
        let registry = PresenceRegistry::new();
        let ghost = ConnectionId::new();
        assert!(!registry.touch_activity(ghost).await);
        assert!(!registry.set_typing(ghost, true).await);
    }

    #[tokio::test]
    async fn test_set_typing_updates_participant() {
        let registry = PresenceRegistry::new();
        let conn = ConnectionId::new();
        registry
            .register(conn, "alice".to_string(), None)
            .await
            .unwrap();

        assert!(registry.set_typing(conn, true).await);
        assert!(registry.lookup(conn).await.unwrap().is_typing);

        assert!(registry.set_typing(conn, false).await);
        assert!(!registry.lookup(conn).await.unwrap().is_typing);
    }

    #[tokio::test]
    async fn test_list_all_snapshot() {
        let registry = PresenceRegistry::new();
        registry
            .register(ConnectionId::new(), "alice".to_string(), None)
            .await
            .unwrap();
        registry
            .register(ConnectionId::new(), "bob".to_string(), None)
            .await
            .unwrap();

        let all = registry.list_all().await;
        assert_eq!(all.len(), 2);
        let mut names: Vec<_> = all.iter().map(|p| p.username.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_list_idle_empty_when_active() {
        let registry = PresenceRegistry::new();
        registry
            .register(ConnectionId::new(), "alice".to_string(), None)
            .await
            .unwrap();
        assert!(registry.list_idle(Duration::from_secs(60)).await.is_empty());
    }
}
