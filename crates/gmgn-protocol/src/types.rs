//! Core protocol types for the GMGN wire format.
//!
//! Outbound, the client only ever sends [`SubscriptionRequest`]s.
//! Inbound, every data frame is reduced to an [`Envelope`]: the few
//! fields the client routes on plus an opaque payload.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// Channel name the server uses for bare transport acknowledgements.
pub const ACK_CHANNEL: &str = "ack";

/// Channel recorded on an [`Envelope`] whose frame carried no usable
/// channel name.
pub const UNKNOWN_CHANNEL: &str = "unknown";

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// The closed set of channels the feed supports.
///
/// On the wire channels are snake_case (`"new_pool_info"`). Parsing also
/// accepts the hyphenated spelling (`"new-pool-info"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Newly created liquidity pools.
    NewPoolInfo,
    /// Trading pair updates.
    NewPairUpdate,
    /// Token launches.
    NewLaunchedInfo,
    /// Chain-wide statistics.
    ChainStat,
    /// Token social links.
    TokenSocialInfo,
    /// Trades of one wallet. Requires a credential.
    WalletTradeData,
    /// Limit order updates. Requires a credential.
    LimitOrderInfo,
}

impl Channel {
    /// Every supported channel.
    pub const ALL: [Channel; 7] = [
        Channel::NewPoolInfo,
        Channel::NewPairUpdate,
        Channel::NewLaunchedInfo,
        Channel::ChainStat,
        Channel::TokenSocialInfo,
        Channel::WalletTradeData,
        Channel::LimitOrderInfo,
    ];

    /// Channels anyone can subscribe to without a credential.
    pub const PUBLIC: [Channel; 5] = [
        Channel::NewPoolInfo,
        Channel::NewPairUpdate,
        Channel::NewLaunchedInfo,
        Channel::ChainStat,
        Channel::TokenSocialInfo,
    ];

    /// The wire name of this channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::NewPoolInfo => "new_pool_info",
            Channel::NewPairUpdate => "new_pair_update",
            Channel::NewLaunchedInfo => "new_launched_info",
            Channel::ChainStat => "chain_stat",
            Channel::TokenSocialInfo => "token_social_info",
            Channel::WalletTradeData => "wallet_trade_data",
            Channel::LimitOrderInfo => "limit_order_info",
        }
    }

    /// Whether subscribing needs an access token.
    pub fn requires_credential(self) -> bool {
        matches!(self, Channel::WalletTradeData | Channel::LimitOrderInfo)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ProtocolError::UnknownChannel(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// SubscriptionRequest
// ---------------------------------------------------------------------------

/// An outbound subscribe frame.
///
/// Serialized field order is fixed by the struct layout:
/// `action, channel, f, id, data, access_token?, retry?`. The optional
/// fields are left out of the JSON entirely when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Always `"subscribe"`.
    pub action: String,
    /// Target channel.
    pub channel: Channel,
    /// Frame flavour; the web client always sends `"w"`.
    pub f: String,
    /// Client-generated request id, unique per request.
    pub id: String,
    /// Ordered parameter maps, e.g. `[{"chain": "sol"}]`.
    pub data: Vec<Map<String, Value>>,
    /// Access token for credential-gated channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Server-side retry hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
}

impl SubscriptionRequest {
    /// Creates a subscribe request with a fresh id.
    pub fn new(channel: Channel, data: Vec<Map<String, Value>>) -> Self {
        Self {
            action: "subscribe".to_owned(),
            channel,
            f: "w".to_owned(),
            id: generate_request_id(),
            data,
            access_token: None,
            retry: None,
        }
    }

    /// Attaches an access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Attaches a retry hint.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Generates a 16-character lowercase hex request id (64 bits).
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One decoded inbound frame.
///
/// Built once by the codec and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The frame's `action` field, if it had one.
    pub action: Option<String>,
    /// The frame's channel, or [`UNKNOWN_CHANNEL`].
    pub channel: String,
    /// The frame's `id` field, if it had one.
    pub id: Option<String>,
    /// The frame's `data` field, or the whole frame body when it has
    /// no `data` field.
    pub payload: Value,
    /// When the client decoded the frame.
    pub received_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// The channel as a known [`Channel`], if it is one.
    pub fn known_channel(&self) -> Option<Channel> {
        self.channel.parse().ok()
    }
}

/// What the codec made of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A regular data frame.
    Envelope(Envelope),
    /// A transport acknowledgement (`"channel": "ack"`). Never
    /// forwarded to consumers.
    Ack(Value),
    /// Valid JSON that is not an object.
    Unexpected(Value),
}
