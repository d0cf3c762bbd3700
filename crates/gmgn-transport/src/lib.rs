//! Transport abstraction layer for the GMGN stream client.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! how the client reaches the feed. The client only ever holds one
//! connection at a time; a [`Connector`] opens it from a
//! [`ConnectRequest`] (endpoint URL with query parameters plus headers).
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket connector via `tokio-tungstenite`

mod error;
mod request;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use request::ConnectRequest;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of the client's single logical connection.
///
/// ```text
/// Disconnected ──→ Connecting ──→ Connected ──→ Closing ──→ Disconnected
///      ▲                              │
///      │                              ▼ (transport dropped)
///      └──── (attempts exhausted) Reconnecting ──→ Connected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no reconnect pending.
    #[default]
    Disconnected,
    /// An explicit connect is opening the transport.
    Connecting,
    /// The transport is open and frames are flowing.
    Connected,
    /// The transport dropped; the reconnect procedure is running.
    Reconnecting,
    /// An explicit disconnect is tearing the connection down.
    Closing,
}

impl ConnectionState {
    /// Whether the connection is down for good, i.e. nothing will bring
    /// it back without an explicit connect.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Opens outbound connections to the feed.
///
/// The returned futures are `Send` because the connection manager calls
/// the connector from a background Tokio task during reconnection.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a new connection described by `request`.
    fn connect(
        &self,
        request: &ConnectRequest,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single duplex connection that carries text frames out and raw
/// frames in.
///
/// Sending and receiving may happen concurrently from different tasks:
/// the receive loop sits in [`recv`](Connection::recv) while subscribe
/// calls go through [`send`](Connection::send).
pub trait Connection: Send + Sync + 'static {
    /// Sends one text frame to the remote peer.
    fn send(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next data frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_equality() {
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(1);
        let c = ConnectionId::new(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_connection_state_is_closed() {
        assert!(ConnectionState::Disconnected.is_closed());
        assert!(ConnectionState::Closing.is_closed());
        assert!(!ConnectionState::Connecting.is_closed());
        assert!(!ConnectionState::Connected.is_closed());
        assert!(!ConnectionState::Reconnecting.is_closed());
    }

    #[test]
    fn test_connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
