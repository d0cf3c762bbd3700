//! The subscription registry: what the client wants to be subscribed to.
//!
//! The server forgets every subscription when the socket drops, so the
//! client keeps its own copy and replays it after reconnecting. The
//! registry holds at most one request per channel; subscribing again
//! replaces the earlier request.
//!
//! # Concurrency note
//!
//! `SubscriptionRegistry` is NOT thread-safe by itself. The client keeps
//! it behind a `std::sync::Mutex` and only holds that lock for the
//! duration of one method call, never across an await.

use std::fmt;
use std::sync::Arc;

use gmgn_protocol::{Channel, SubscriptionRequest};
use serde_json::{Map, Value};

use crate::{CredentialProvider, StaticCredential, SubscriptionError};

/// Desired subscription state, one request per channel.
///
/// Iteration order is first-subscription order: re-subscribing a
/// channel replaces its request but keeps its position, so replay after
/// a reconnect happens in the order the caller originally subscribed.
pub struct SubscriptionRegistry {
    /// `Vec` rather than a map: there are only seven channels, and the
    /// order matters for replay.
    entries: Vec<SubscriptionRequest>,

    /// Fallback source of access tokens for gated channels.
    credentials: Arc<dyn CredentialProvider>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry with no credential fallback.
    pub fn new() -> Self {
        Self::with_credentials(Arc::new(StaticCredential::none()))
    }

    /// Creates an empty registry that asks `credentials` for a token
    /// when a gated channel is subscribed without one.
    pub fn with_credentials(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            entries: Vec::new(),
            credentials,
        }
    }

    /// Records a subscription and returns the request to transmit.
    ///
    /// # Arguments
    /// - `channel`: wire name (`"new_pool_info"`) or hyphenated form
    /// - `parameters`: the request's `data` maps, e.g. `[{"chain": "sol"}]`
    /// - `credential`: access token for gated channels; falls back to
    ///   the registry's [`CredentialProvider`] when `None`
    ///
    /// Gated requests carry `access_token`, and `wallet_trade_data` also
    /// carries `retry = 1`. Public channels never carry a token.
    ///
    /// # Errors
    /// - [`SubscriptionError::UnsupportedChannel`] for an unknown name
    /// - [`SubscriptionError::MissingParameter`] for `wallet_trade_data`
    ///   without a non-empty `addresses` parameter (checked before the
    ///   credential)
    /// - [`SubscriptionError::CredentialRequired`] for a gated channel
    ///   with no token from either source
    ///
    /// On error the registry is unchanged.
    pub fn subscribe(
        &mut self,
        channel: &str,
        parameters: Vec<Map<String, Value>>,
        credential: Option<String>,
    ) -> Result<SubscriptionRequest, SubscriptionError> {
        let channel: Channel = channel
            .parse()
            .map_err(|_| SubscriptionError::UnsupportedChannel(channel.to_owned()))?;

        if channel == Channel::WalletTradeData && !has_addresses(&parameters) {
            return Err(SubscriptionError::MissingParameter("addresses"));
        }

        let mut request = SubscriptionRequest::new(channel, parameters);
        if channel.requires_credential() {
            let token = credential
                .filter(|t| !t.is_empty())
                .or_else(|| self.credentials.access_token())
                .ok_or(SubscriptionError::CredentialRequired(channel))?;
            request = request.with_access_token(token);
            if channel == Channel::WalletTradeData {
                request = request.with_retry(1);
            }
        }

        match self.entries.iter_mut().find(|r| r.channel == channel) {
            Some(slot) => *slot = request.clone(),
            None => self.entries.push(request.clone()),
        }
        tracing::debug!(%channel, id = %request.id, "subscription recorded");

        Ok(request)
    }

    /// Snapshot of every recorded request, in replay order.
    pub fn all(&self) -> Vec<SubscriptionRequest> {
        self.entries.clone()
    }

    /// The request recorded for `channel`, if any.
    pub fn get(&self, channel: Channel) -> Option<&SubscriptionRequest> {
        self.entries.iter().find(|r| r.channel == channel)
    }

    /// Whether `channel` has a recorded request.
    pub fn contains(&self, channel: Channel) -> bool {
        self.get(channel).is_some()
    }

    /// Forgets the request for `channel`, returning it.
    ///
    /// Only local state changes; the server keeps streaming until the
    /// socket closes.
    pub fn remove(&mut self, channel: Channel) -> Option<SubscriptionRequest> {
        let pos = self.entries.iter().position(|r| r.channel == channel)?;
        Some(self.entries.remove(pos))
    }

    /// Forgets every request. Nothing is sent to the server.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of recorded requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether some parameter map names at least one wallet address.
fn has_addresses(parameters: &[Map<String, Value>]) -> bool {
    parameters.iter().any(|params| match params.get("addresses") {
        Some(Value::String(address)) => !address.is_empty(),
        Some(Value::Array(addresses)) => !addresses.is_empty(),
        _ => false,
    })
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}
