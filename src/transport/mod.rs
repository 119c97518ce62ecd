//! Transport abstraction
//!
//! The bidirectional channel itself (websocket, QUIC stream, ...) lives
//! outside this crate. The coordinator only needs to deliver an event to a
//! single connection and to force a connection closed; room fan-out is the
//! coordinator's job because room membership is owned by the directory.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::protocol::events::OutboundEvent;

/// Opaque per-connection handle issued by the transport.
///
/// Primary key for all per-connection state; created on connect,
/// invalidated on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Delivery interface implemented by the transport layer
pub trait Transport: Send + Sync {
    /// Deliver an event to a single connection
    fn send(&self, to: ConnectionId, event: &OutboundEvent) -> Result<()>;

    /// Terminate a connection. `force` skips any graceful shutdown the
    /// transport would otherwise perform.
    fn close(&self, to: ConnectionId, force: bool);
}

/// Channel-backed transport: one unbounded sender per connection.
///
/// The process hosting the real transport registers an outbound channel per
/// accepted connection and forwards whatever arrives on the receiver down
/// the wire. Closing drops the sender, which ends the receiver stream.
///
/// Delivery is a plain map lookup plus an unbounded channel send, so the
/// registry uses a std lock; critical sections never block or await.
pub struct ChannelTransport {
    outbound: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<OutboundEvent>>>,
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            outbound: RwLock::new(HashMap::new()),
        })
    }

    /// Register a connection and get the receiving half of its outbound queue
    pub fn register(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.write_outbound().insert(id, tx);
        rx
    }

    /// Drop a connection's outbound queue
    pub fn unregister(&self, id: ConnectionId) {
        self.write_outbound().remove(&id);
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.read_outbound().len()
    }

    // Poisoning only happens if a holder panicked; the map itself stays
    // consistent, so recover the guard rather than propagate.
    fn read_outbound(
        &self,
    ) -> RwLockReadGuard<'_, HashMap<ConnectionId, mpsc::UnboundedSender<OutboundEvent>>> {
        self.outbound.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_outbound(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<ConnectionId, mpsc::UnboundedSender<OutboundEvent>>> {
        self.outbound.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: ConnectionId, event: &OutboundEvent) -> Result<()> {
        match self.read_outbound().get(&to) {
            Some(tx) => tx
                .send(event.clone())
                .map_err(|_| RelayError::transport(format!("connection {} gone", to))),
            None => Err(RelayError::transport(format!("unknown connection {}", to))),
        }
    }

    fn close(&self, to: ConnectionId, force: bool) {
        debug!("closing connection {} (force: {})", to, force);
        self.write_outbound().remove(&to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::ErrorPayload;

    #[tokio::test]
    async fn test_channel_transport_delivery() {
        let transport = ChannelTransport::new();
        let conn = ConnectionId::new();
        let mut rx = transport.register(conn);

        let event = OutboundEvent::Kicked {
            message: "bye".to_string(),
        };
        transport.send(conn, &event).unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_send_to_unknown_connection_fails() {
        let transport = ChannelTransport::new();
        let event = OutboundEvent::MessageError(ErrorPayload {
            code: "NOT_IN_ROOM".to_string(),
            message: "Not in a room".to_string(),
        });
        let err = transport.send(ConnectionId::new(), &event).unwrap_err();
        assert_eq!(err.code(), "TRANSPORT_FAILURE");
    }

    #[test]
    fn test_close_removes_connection() {
        let transport = ChannelTransport::new();
        let conn = ConnectionId::new();
        let _rx = transport.register(conn);
        assert_eq!(transport.connection_count(), 1);

        transport.close(conn, true);
        assert_eq!(transport.connection_count(), 0);
    }
}
