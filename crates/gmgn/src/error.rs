//! Unified error type for the GMGN stream client.

use gmgn_protocol::{Channel, ProtocolError};
use gmgn_session::SubscriptionError;
use gmgn_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `gmgn` crate you deal with this single error type
/// instead of importing errors from each layer. `#[from]` conversions
/// let `?` lift layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GmgnError {
    /// Opening, using or closing the transport failed.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// The operation needs a live connection and there is none.
    #[error("not connected")]
    NotConnected,

    /// A credential-gated channel was subscribed without an access token.
    #[error("access token is required for {0}")]
    Authentication(Channel),

    /// The subscription was rejected before anything was sent.
    #[error(transparent)]
    Subscription(SubscriptionError),

    /// The subscription was recorded but could not be sent.
    #[error("failed to subscribe to {channel}: {source}")]
    SubscribeFailed {
        /// The channel being subscribed.
        channel: Channel,
        /// Why the send failed.
        #[source]
        source: TransportError,
    },

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    MessageParsing(#[from] ProtocolError),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<SubscriptionError> for GmgnError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::CredentialRequired(channel) => Self::Authentication(channel),
            other => Self::Subscription(other),
        }
    }
}
