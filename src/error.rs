//! Error handling for the chat relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
///
/// Validation failures are reported back to the originating connection as
/// `*-error` events carrying [`RelayError::code`]; they never abort other
/// in-flight events and are never fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Display name already reserved by a live participant
    NameTaken(String),
    /// Unknown connection or room
    NotFound(String),
    /// Operation requires the connection to occupy a room
    NotInRoom(String),
    /// Connection already occupies a different room
    AlreadyInRoom(String),
    /// Room member limit reached (reserved for future room size limits)
    CapacityExceeded(String),
    /// Delivery to a peer failed
    Transport(String),
    /// Credential token rejected by the authenticator
    Auth(String),
    /// Malformed or empty event payload
    InvalidEvent(String),
    /// Unexpected internal condition
    Internal(String),
}

impl RelayError {
    /// Wire code for this error, as carried by `join-error` / `message-error`
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::NameTaken(_) => "USERNAME_TAKEN",
            RelayError::NotFound(_) => "NOT_FOUND",
            RelayError::NotInRoom(_) => "NOT_IN_ROOM",
            RelayError::AlreadyInRoom(_) => "ALREADY_IN_ROOM",
            RelayError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            RelayError::Transport(_) => "TRANSPORT_FAILURE",
            RelayError::Auth(_) => "AUTH_FAILED",
            RelayError::InvalidEvent(_) => "INVALID_EVENT",
            RelayError::Internal(_) => "SERVER_ERROR",
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            RelayError::NameTaken(msg) => msg,
            RelayError::NotFound(msg) => msg,
            RelayError::NotInRoom(msg) => msg,
            RelayError::AlreadyInRoom(msg) => msg,
            RelayError::CapacityExceeded(msg) => msg,
            RelayError::Transport(msg) => msg,
            RelayError::Auth(msg) => msg,
            RelayError::InvalidEvent(msg) => msg,
            RelayError::Internal(msg) => msg,
        }
    }

    /// Create a name-taken error
    pub fn name_taken<T: Into<String>>(msg: T) -> Self {
        RelayError::NameTaken(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        RelayError::NotFound(msg.into())
    }

    /// Create a not-in-room error
    pub fn not_in_room<T: Into<String>>(msg: T) -> Self {
        RelayError::NotInRoom(msg.into())
    }

    /// Create an already-in-room error
    pub fn already_in_room<T: Into<String>>(msg: T) -> Self {
        RelayError::AlreadyInRoom(msg.into())
    }

    /// Create a transport error
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        RelayError::Transport(msg.into())
    }

    /// Create an authentication error
    pub fn auth<T: Into<String>>(msg: T) -> Self {
        RelayError::Auth(msg.into())
    }

    /// Create an invalid-event error
    pub fn invalid_event<T: Into<String>>(msg: T) -> Self {
        RelayError::InvalidEvent(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        RelayError::Internal(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NameTaken(msg) => write!(f, "Username taken: {}", msg),
            RelayError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RelayError::NotInRoom(msg) => write!(f, "Not in a room: {}", msg),
            RelayError::AlreadyInRoom(msg) => write!(f, "Already in a room: {}", msg),
            RelayError::CapacityExceeded(msg) => write!(f, "Capacity exceeded: {}", msg),
            RelayError::Transport(msg) => write!(f, "Transport failure: {}", msg),
            RelayError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            RelayError::InvalidEvent(msg) => write!(f, "Invalid event: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::InvalidEvent(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RelayError::name_taken("alice").code(), "USERNAME_TAKEN");
        assert_eq!(RelayError::not_in_room("no room").code(), "NOT_IN_ROOM");
        assert_eq!(RelayError::auth("bad token").code(), "AUTH_FAILED");
        assert_eq!(RelayError::internal("boom").code(), "SERVER_ERROR");
    }

    #[test]
    fn test_display_includes_message() {
        let err = RelayError::name_taken("alice");
        assert_eq!(err.to_string(), "Username taken: alice");
        assert_eq!(err.message(), "alice");
    }
}
