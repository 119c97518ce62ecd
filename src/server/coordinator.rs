//! Session coordinator: the protocol state machine
//!
//! Receives inbound events, validates them against the presence registry
//! and room directory, mutates both, and emits the outbound fan-out through
//! the transport. Per connection the states are Anonymous -> Identified
//! (registered, no room) -> InRoom, with Disconnected reachable from
//! anywhere.
//!
//! Validation failures are reported to the originating connection only and
//! never abort other in-flight events. Teardown is best-effort: delivery
//! failures are logged and never block registry or directory cleanup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::current_timestamp;
use crate::error::{RelayError, Result};
use crate::protocol::events::{
    ClientEvent, ErrorPayload, Message, MessageKind, OutboundEvent, ParticipantInfo,
    RoomId, RoomInfoPayload, RoomsListPayload, TypingUpdate,
};
use crate::server::presence::{Participant, PresenceRegistry};
use crate::server::rooms::RoomDirectory;
use crate::transport::{ConnectionId, Transport};
use crate::RelayConfig;

/// Protocol/state-machine layer between the transport and the registries
pub struct SessionCoordinator {
    config: RelayConfig,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomDirectory>,
    transport: Arc<dyn Transport>,
    authenticator: Option<Arc<dyn Authenticator>>,
    /// Sequence half of message ids (timestamp + sequence)
    message_seq: AtomicU64,
}

impl SessionCoordinator {
    pub fn new(
        config: RelayConfig,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            presence,
            rooms,
            transport,
            authenticator: None,
            message_seq: AtomicU64::new(0),
        }
    }

    /// Wire in the optional authentication collaborator
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.rooms
    }

    /// Dispatch one inbound event from the transport
    pub async fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom {
                username,
                room_id,
                token,
            } => self.handle_join_room(conn, username, room_id, token).await,
            ClientEvent::SendMessage { content, kind } => {
                self.handle_send_message(conn, content, kind).await
            }
            ClientEvent::UserTyping { is_typing } => self.handle_typing(conn, is_typing).await,
            ClientEvent::GetRooms => self.handle_get_rooms(conn).await,
            ClientEvent::GetRoomInfo { room_id } => {
                self.handle_get_room_info(conn, room_id).await
            }
            ClientEvent::Disconnect { reason } => self.handle_disconnect(conn, &reason).await,
        }
    }

    /// The display name is bound at first registration and fixed for the
    /// connection's lifetime: a later join-room with a different username
    /// keeps the registered name, and the `join-success` payload carries
    /// the registered name so the caller sees which one is in effect.
    /// Renaming requires a disconnect and a fresh join.
    async fn handle_join_room(
        &self,
        conn: ConnectionId,
        username: String,
        room_id: Option<RoomId>,
        token: Option<String>,
    ) {
        let username = username.trim().to_string();
        if username.is_empty() {
            self.send_to(
                conn,
                &OutboundEvent::JoinError(ErrorPayload::from(&RelayError::invalid_event(
                    "Username must not be empty",
                ))),
            );
            return;
        }
        let room_id = room_id.unwrap_or_else(|| self.config.default_room.clone());

        let participant = match self.presence.lookup(conn).await {
            Ok(existing) => {
                // Re-join of the occupied room is a no-op success: confirm
                // to the caller, broadcast nothing.
                if existing.current_room.as_deref() == Some(room_id.as_str()) {
                    self.send_to(
                        conn,
                        &OutboundEvent::JoinSuccess {
                            user: existing.to_info(),
                            room_id: room_id.clone(),
                        },
                    );
                    let users = self.member_infos(&room_id).await;
                    self.send_to(conn, &OutboundEvent::RoomUsers(users));
                    return;
                }

                if existing.username != username {
                    debug!(
                        "{} requested name {} but stays registered as {}",
                        conn, username, existing.username
                    );
                }

                // Leave-then-join: the old room's departure sequence must
                // complete before the new join is attempted.
                if existing.current_room.is_some() {
                    self.depart_current(&existing).await;
                }
                existing
            }
            Err(_) => {
                let user_id = match self.verify_token(token.as_deref()) {
                    Ok(user_id) => user_id,
                    Err(err) => {
                        self.send_to(conn, &OutboundEvent::JoinError(ErrorPayload::from(&err)));
                        return;
                    }
                };

                match self.presence.register(conn, username, user_id).await {
                    Ok(p) => p,
                    Err(err) => {
                        self.send_to(conn, &OutboundEvent::JoinError(ErrorPayload::from(&err)));
                        return;
                    }
                }
            }
        };

        self.enter_room(&participant, room_id).await;
    }

    /// Steps (c)-(g) of the join transition, as one logical unit: if the
    /// directory join fails, nothing is broadcast and the caller stays
    /// Identified, room-less.
    async fn enter_room(&self, participant: &Participant, room_id: RoomId) {
        self.rooms.ensure_room(&room_id).await;
        if let Err(err) = self.rooms.join(&room_id, participant.id).await {
            warn!(
                "join of {} to room {} failed: {}",
                participant.username, room_id, err
            );
            self.send_to(
                participant.id,
                &OutboundEvent::JoinError(ErrorPayload::from(&err)),
            );
            return;
        }
        self.presence
            .set_room(participant.id, Some(room_id.clone()))
            .await;
        self.presence.touch_activity(participant.id).await;

        let joined = participant.to_info();
        self.send_to(
            participant.id,
            &OutboundEvent::JoinSuccess {
                user: joined.clone(),
                room_id: room_id.clone(),
            },
        );
        self.broadcast(&room_id, &OutboundEvent::UserJoined(joined), Some(participant.id))
            .await;

        let users = self.member_infos(&room_id).await;
        self.broadcast(&room_id, &OutboundEvent::RoomUsers(users), None)
            .await;

        let notice = format!("{} joined the chat", participant.username);
        self.post_system_message(&room_id, notice).await;

        info!("{} joined room {}", participant.username, room_id);
    }

    async fn handle_send_message(
        &self,
        conn: ConnectionId,
        content: String,
        kind: Option<MessageKind>,
    ) {
        let sender = self
            .presence
            .lookup(conn)
            .await
            .ok()
            .and_then(|p| p.current_room.clone().map(|room| (p, room)));
        let Some((sender, room_id)) = sender else {
            self.send_to(
                conn,
                &OutboundEvent::MessageError(ErrorPayload::from(&RelayError::not_in_room(
                    "Not in a room",
                ))),
            );
            return;
        };

        if content.is_empty() {
            self.send_to(
                conn,
                &OutboundEvent::MessageError(ErrorPayload::from(&RelayError::invalid_event(
                    "Message content must not be empty",
                ))),
            );
            return;
        }

        self.presence.touch_activity(conn).await;

        let kind = kind.unwrap_or(MessageKind::User);
        let now = current_timestamp();
        let message = match kind {
            MessageKind::User => Message::user(
                self.next_message_id(kind, now),
                sender.username.clone(),
                content,
                now,
            ),
            MessageKind::System => Message::system(self.next_message_id(kind, now), content, now),
        };

        self.rooms.append(&room_id, message.clone()).await;
        self.broadcast(&room_id, &OutboundEvent::MessageReceived(message), None)
            .await;

        debug!("message from {} in room {}", sender.username, room_id);
    }

    async fn handle_typing(&self, conn: ConnectionId, is_typing: bool) {
        // Typing outside a room is a no-op, not an error
        let participant = match self.presence.lookup(conn).await {
            Ok(p) => p,
            Err(_) => return,
        };
        let Some(room_id) = participant.current_room.clone() else {
            return;
        };

        self.presence.set_typing(conn, is_typing).await;

        self.broadcast(
            &room_id,
            &OutboundEvent::UserTypingUpdate(TypingUpdate {
                username: participant.username,
                is_typing,
            }),
            Some(conn),
        )
        .await;
    }

    async fn handle_get_rooms(&self, conn: ConnectionId) {
        let rooms = self.rooms.room_summaries().await;
        let total_rooms = rooms.len();
        self.send_to(
            conn,
            &OutboundEvent::RoomsList(RoomsListPayload { rooms, total_rooms }),
        );
    }

    async fn handle_get_room_info(&self, conn: ConnectionId, room_id: RoomId) {
        let created_at = self.rooms.created_at(&room_id).await;
        let users = self.member_infos(&room_id).await;
        let recent_messages = self
            .rooms
            .tail(&room_id, self.config.room_info_messages)
            .await;

        self.send_to(
            conn,
            &OutboundEvent::RoomInfo(RoomInfoPayload {
                room_id,
                created_at,
                user_count: users.len(),
                users,
                recent_messages,
            }),
        );
    }

    /// Connection teardown, legal from any state. Cleanup always completes;
    /// notifying the remaining members is best-effort.
    pub async fn handle_disconnect(&self, conn: ConnectionId, reason: &str) {
        let removed = match self.presence.unregister(&self.rooms, conn).await {
            Ok(p) => p,
            Err(_) => {
                debug!("disconnect for unknown connection {}", conn);
                return;
            }
        };

        info!("{} disconnected: {}", removed.username, reason);

        if let Some(room_id) = removed.current_room.clone() {
            let notice = format!("{} left the chat", removed.username);
            self.notify_departure(&room_id, &removed, notice).await;
        }
    }

    /// Forcibly remove a connection: full disconnect sequence, then the
    /// transport terminates the connection.
    pub async fn kick(&self, conn: ConnectionId) -> Result<()> {
        // Notify the target before its registration disappears
        self.presence.lookup(conn).await?;
        self.send_to(
            conn,
            &OutboundEvent::Kicked {
                message: "You have been kicked from the room".to_string(),
            },
        );

        let removed = self.presence.unregister(&self.rooms, conn).await?;
        info!("{} kicked", removed.username);

        if let Some(room_id) = removed.current_room.clone() {
            let notice = format!("{} was kicked from the chat", removed.username);
            self.notify_departure(&room_id, &removed, notice).await;
        }

        self.transport.close(conn, true);
        Ok(())
    }

    /// Disconnect every participant idle for at least `idle_for`.
    /// Returns the number of connections reaped.
    pub async fn cleanup_stale(&self, idle_for: Duration) -> usize {
        let stale = self.presence.list_idle(idle_for).await;
        let count = stale.len();
        for participant in stale {
            self.handle_disconnect(participant.id, "idle timeout").await;
            self.transport.close(participant.id, false);
        }
        if count > 0 {
            info!("cleaned up {} stale connections", count);
        }
        count
    }

    /// Leave the current room as part of switching rooms, broadcasting the
    /// departure sequence to the old room.
    async fn depart_current(&self, participant: &Participant) {
        let Some(room_id) = participant.current_room.clone() else {
            return;
        };
        self.rooms.leave(&room_id, participant.id).await;
        self.presence.set_room(participant.id, None).await;

        let notice = format!("{} left the chat", participant.username);
        self.notify_departure(&room_id, participant, notice).await;
    }

    /// user-left + refreshed member list + system message to whoever is
    /// still in the room. The departed connection is already out of the
    /// member set, so the fan-out naturally excludes it.
    async fn notify_departure(&self, room_id: &str, departed: &Participant, notice: String) {
        self.broadcast(room_id, &OutboundEvent::UserLeft(departed.to_info()), None)
            .await;

        let users = self.member_infos(room_id).await;
        if !users.is_empty() {
            self.broadcast(room_id, &OutboundEvent::RoomUsers(users), None)
                .await;
        }

        self.post_system_message(room_id, notice).await;
    }

    /// Append a system message and broadcast it. Skipped when the room is
    /// already gone (nobody left to tell).
    async fn post_system_message(&self, room_id: &str, content: String) {
        let now = current_timestamp();
        let message = Message::system(
            self.next_message_id(MessageKind::System, now),
            content,
            now,
        );
        if self.rooms.append(room_id, message.clone()).await {
            self.broadcast(room_id, &OutboundEvent::MessageReceived(message), None)
                .await;
        }
    }

    /// Member snapshot of a room, sorted by display name for determinism
    async fn member_infos(&self, room_id: &str) -> Vec<ParticipantInfo> {
        let ids = self.rooms.member_ids(room_id).await;
        let mut infos = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(p) = self.presence.lookup(id).await {
                infos.push(p.to_info());
            }
        }
        infos.sort_by(|a, b| a.username.cmp(&b.username));
        infos
    }

    /// Deliver to every current member of a room, optionally excluding one
    /// connection. A failed delivery is logged and never aborts the rest.
    async fn broadcast(
        &self,
        room_id: &str,
        event: &OutboundEvent,
        exclude: Option<ConnectionId>,
    ) {
        for id in self.rooms.member_ids(room_id).await {
            if Some(id) == exclude {
                continue;
            }
            if let Err(err) = self.transport.send(id, event) {
                warn!("delivery of {} to {} failed: {}", event.name(), id, err);
            }
        }
    }

    /// Deliver to one connection, logging a failed delivery
    fn send_to(&self, conn: ConnectionId, event: &OutboundEvent) {
        if let Err(err) = self.transport.send(conn, event) {
            warn!("delivery of {} to {} failed: {}", event.name(), conn, err);
        }
    }

    fn verify_token(&self, token: Option<&str>) -> Result<Option<String>> {
        match (&self.authenticator, token) {
            (Some(authenticator), Some(token)) => {
                let identity = authenticator.authenticate(token)?;
                Ok(Some(identity.user_id))
            }
            _ => Ok(None),
        }
    }

    fn next_message_id(&self, kind: MessageKind, timestamp: u64) -> String {
        let seq = self.message_seq.fetch_add(1, Ordering::Relaxed);
        match kind {
            MessageKind::User => format!("msg_{}_{}", timestamp, seq),
            MessageKind::System => format!("system_{}_{}", timestamp, seq),
        }
    }
}
