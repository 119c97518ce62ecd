//! Event types exchanged with the transport
//!
//! Inbound events arrive from clients with the originating [`ConnectionId`];
//! outbound events are delivered either to a single requesting connection or
//! fanned out to a room's member set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::transport::ConnectionId;

/// Room identifier ("general", "random", ...)
pub type RoomId = String;

/// Message classification: user-authored or server-generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    System,
}

/// A single chat message, immutable once appended to a room log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id, timestamp + sequence (`msg_<ts>_<seq>` / `system_<ts>_<seq>`)
    pub id: String,
    /// Author display name ("System" for system messages)
    pub user: String,
    /// Message body
    pub content: String,
    /// Creation timestamp in millis
    pub created_at: u64,
    /// Message kind
    pub kind: MessageKind,
}

impl Message {
    /// Create a user message
    pub fn user(id: String, author: String, content: String, created_at: u64) -> Self {
        Self {
            id,
            user: author,
            content,
            created_at,
            kind: MessageKind::User,
        }
    }

    /// Create a server-generated system message (join/leave/kick notices)
    pub fn system(id: String, content: String, created_at: u64) -> Self {
        Self {
            id,
            user: "System".to_string(),
            content,
            created_at,
            kind: MessageKind::System,
        }
    }
}

/// Wire view of a participant, as carried by `room-users` and friends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: ConnectionId,
    pub username: String,
    pub joined_at: u64,
    pub is_typing: bool,
}

/// Error payload delivered to the originating connection only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&RelayError> for ErrorPayload {
    fn from(err: &RelayError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

/// Typing indicator broadcast to the other members of a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub username: String,
    pub is_typing: bool,
}

/// Room directory snapshot: room id -> member count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsListPayload {
    pub rooms: BTreeMap<RoomId, usize>,
    pub total_rooms: usize,
}

/// Snapshot of a single room: members sorted by name plus recent messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoPayload {
    pub room_id: RoomId,
    /// Absent when the room does not exist
    pub created_at: Option<u64>,
    pub user_count: usize,
    pub users: Vec<ParticipantInfo>,
    pub recent_messages: Vec<Message>,
}

/// Inbound events consumed from the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Join a named room, registering the display name if anonymous
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        username: String,
        #[serde(default)]
        room_id: Option<RoomId>,
        /// Optional credential token, verified when an authenticator is wired
        #[serde(default)]
        token: Option<String>,
    },

    /// Post a message to the current room
    #[serde(rename_all = "camelCase")]
    SendMessage {
        content: String,
        #[serde(default)]
        kind: Option<MessageKind>,
    },

    /// Typing indicator for the current room
    #[serde(rename_all = "camelCase")]
    UserTyping { is_typing: bool },

    /// Request the room directory snapshot
    GetRooms,

    /// Request a single room snapshot
    #[serde(rename_all = "camelCase")]
    GetRoomInfo { room_id: RoomId },

    /// Connection teardown; fires automatically when the transport drops
    Disconnect { reason: String },
}

/// Outbound events produced by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Join accepted; sent to the joining connection only
    #[serde(rename_all = "camelCase")]
    JoinSuccess {
        user: ParticipantInfo,
        room_id: RoomId,
    },

    /// Join rejected; sent to the joining connection only
    JoinError(ErrorPayload),

    /// A new member entered the room; sent to the other members
    UserJoined(ParticipantInfo),

    /// A member left the room; sent to the remaining members
    UserLeft(ParticipantInfo),

    /// Refreshed member list, sorted by display name
    RoomUsers(Vec<ParticipantInfo>),

    /// Message fan-out, sender included
    MessageReceived(Message),

    /// Message rejected; sent to the sender only
    MessageError(ErrorPayload),

    /// Typing indicator, sender excluded
    UserTypingUpdate(TypingUpdate),

    /// Room directory snapshot, requester only
    RoomsList(RoomsListPayload),

    /// Single room snapshot, requester only
    RoomInfo(RoomInfoPayload),

    /// The connection has been administratively removed
    Kicked { message: String },
}

impl OutboundEvent {
    /// Wire name of this event, for logging
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinSuccess { .. } => "join-success",
            OutboundEvent::JoinError(_) => "join-error",
            OutboundEvent::UserJoined(_) => "user-joined",
            OutboundEvent::UserLeft(_) => "user-left",
            OutboundEvent::RoomUsers(_) => "room-users",
            OutboundEvent::MessageReceived(_) => "message-received",
            OutboundEvent::MessageError(_) => "message-error",
            OutboundEvent::UserTypingUpdate(_) => "user-typing-update",
            OutboundEvent::RoomsList(_) => "rooms-list",
            OutboundEvent::RoomInfo(_) => "room-info",
            OutboundEvent::Kicked { .. } => "kicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let json = r#"{"event":"join-room","data":{"username":"alice","roomId":"general"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinRoom {
                username: "alice".to_string(),
                room_id: Some("general".to_string()),
                token: None,
            }
        );
    }

    #[test]
    fn test_join_room_defaults() {
        let json = r#"{"event":"join-room","data":{"username":"bob"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::JoinRoom {
                username,
                room_id,
                token,
            } => {
                assert_eq!(username, "bob");
                assert!(room_id.is_none());
                assert!(token.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_outbound_event_tags() {
        let event = OutboundEvent::JoinError(ErrorPayload {
            code: "USERNAME_TAKEN".to_string(),
            message: "Username already taken".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"join-error""#));
        assert!(json.contains(r#""code":"USERNAME_TAKEN""#));
        assert_eq!(event.name(), "join-error");
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::system("system_1_0".to_string(), "alice joined the chat".to_string(), 42);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""kind":"system""#));
        assert!(json.contains(r#""user":"System""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_error_payload_from_relay_error() {
        let err = RelayError::not_in_room("Not in a room");
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, "NOT_IN_ROOM");
        assert_eq!(payload.message, "Not in a room");
    }
}
