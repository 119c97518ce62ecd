//! Chat relay core with room-scoped message fan-out
//!
//! This library provides the connection-presence-room registry for a
//! real-time chat relay: it tracks which connection belongs to which
//! participant, which room a connection currently occupies, and validates
//! and broadcasts join/leave/message/typing events to room members.
//!
//! The transport (the bidirectional channel itself) is abstracted behind
//! the [`Transport`] trait; authentication behind [`Authenticator`].

pub mod auth;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use auth::{Authenticator, Identity};
pub use error::{RelayError, Result};
pub use protocol::events::{ClientEvent, Message, MessageKind, OutboundEvent, RoomId};
pub use server::buffer::MessageBuffer;
pub use server::coordinator::SessionCoordinator;
pub use server::presence::{Participant, PresenceRegistry};
pub use server::rooms::RoomDirectory;
pub use transport::{ChannelTransport, ConnectionId, Transport};

use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Room joined when a join-room event carries no room id
    pub default_room: String,
    /// Maximum messages retained per room (oldest evicted first)
    pub message_capacity: usize,
    /// Default number of messages returned by a tail query
    pub tail_limit: usize,
    /// Messages included in a room-info snapshot
    pub room_info_messages: usize,
    /// Keep a room's message log when its last member leaves.
    /// When false (the default) the log is dropped with the room record.
    pub retain_empty_room_log: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_room: "general".to_string(),
            message_capacity: 100,
            tail_limit: 50,
            room_info_messages: 20,
            retain_empty_room_log: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.default_room, "general");
        assert_eq!(config.message_capacity, 100);
        assert_eq!(config.tail_limit, 50);
        assert!(!config.retain_empty_room_log);
    }

    #[test]
    fn test_timestamp_monotonic_enough() {
        let a = current_timestamp();
        let b = current_timestamp();
        assert!(b >= a);
    }
}
