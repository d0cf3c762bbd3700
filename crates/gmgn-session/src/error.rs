//! Error types for the subscription layer.

use gmgn_protocol::Channel;

/// Errors raised while recording a subscription.
///
/// The registry is left untouched whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The channel name is not one the feed supports.
    #[error("unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// The channel is credential-gated and no access token was supplied
    /// or configured.
    #[error("access token is required for channel {0}")]
    CredentialRequired(Channel),

    /// A parameter the channel needs was empty or absent.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
}
