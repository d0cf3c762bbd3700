//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the problem is in turning frames into
//! values or values into frames, never in networking.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of an outbound request failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// An inbound frame is not well-formed JSON.
    ///
    /// This is the "message parsing" failure of the client: the frame
    /// is dropped and the receive loop carries on.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The channel name is not one of the supported channels.
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
}
