/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection request could not be built (bad endpoint URL,
    /// illegal header name or value).
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),

    /// Opening the connection failed (DNS, TCP, TLS, or the upgrade
    /// handshake was rejected).
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// A write hit a socket that is already closing or closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}
