//! `GmgnClient`: the public facade.
//!
//! Ties the layers together: subscriptions are recorded in the registry,
//! encoded by the codec and sent through the connection manager; inbound
//! frames come back out through handlers and the listener.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gmgn_dispatch::{DispatchStats, Dispatcher, Handler, Listener, UnexpectedFramePolicy};
use gmgn_protocol::{Channel, FrameCodec};
use gmgn_session::{CredentialProvider, StaticCredential, SubscriptionRegistry};
use gmgn_transport::{ConnectionState, Connector, WebSocketConnector};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::connection::ConnectionManager;
use crate::{ClientConfig, GmgnError};

/// Chain used by the convenience subscriptions when the caller has no
/// preference.
pub const DEFAULT_CHAIN: &str = "sol";

fn chain_params(chain: &str) -> Vec<Map<String, Value>> {
    let mut params = Map::new();
    params.insert("chain".to_owned(), Value::String(chain.to_owned()));
    vec![params]
}

/// Streaming client for the GMGN feed.
///
/// Cheap to clone; clones share one connection, one subscription
/// registry and one delivery queue.
///
/// # Example
///
/// ```rust,no_run
/// use gmgn::prelude::*;
///
/// # async fn run() -> Result<(), GmgnError> {
/// let client = GmgnClient::builder().build()?;
///
/// client.on("new_pool_info", Handler::sync(|pool| {
///     println!("new pool: {pool}");
///     Ok(())
/// }));
///
/// client.connect().await?;
/// client.subscribe_new_pools("sol").await?;
/// client.run_forever().await
/// # }
/// ```
pub struct GmgnClient<C: Connector = WebSocketConnector> {
    connection: ConnectionManager<C>,
    subscriptions: Arc<Mutex<SubscriptionRegistry>>,
    dispatcher: Arc<Dispatcher>,
    codec: FrameCodec,
    listen_idle_timeout: Duration,
}

impl<C: Connector> Clone for GmgnClient<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            dispatcher: Arc::clone(&self.dispatcher),
            codec: self.codec,
            listen_idle_timeout: self.listen_idle_timeout,
        }
    }
}

impl<C: Connector> fmt::Debug for GmgnClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmgnClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GmgnClient<WebSocketConnector> {
    /// Creates a WebSocket client from `config`.
    ///
    /// # Errors
    /// Returns [`GmgnError::Config`] if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, GmgnError> {
        Self::with_connector(config, WebSocketConnector::new())
    }

    /// Creates a builder starting from [`ClientConfig::default`].
    pub fn builder() -> GmgnClientBuilder {
        GmgnClientBuilder::new()
    }
}

impl<C: Connector> GmgnClient<C> {
    /// Creates a client that opens its connections through `connector`.
    ///
    /// The access token in `config`, if any, backs credential-gated
    /// subscriptions made without an explicit token.
    ///
    /// # Errors
    /// Returns [`GmgnError::Config`] if the configuration is invalid.
    pub fn with_connector(config: ClientConfig, connector: C) -> Result<Self, GmgnError> {
        let credentials = Arc::new(StaticCredential::from(config.credential.clone()));
        Self::assemble(config, connector, credentials)
    }

    fn assemble(
        config: ClientConfig,
        connector: C,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GmgnError> {
        config.validate()?;

        let subscriptions = Arc::new(Mutex::new(SubscriptionRegistry::with_credentials(
            credentials,
        )));
        let dispatcher = Arc::new(Dispatcher::new(config.unexpected_frame_policy));
        let listen_idle_timeout = config.listen_idle_timeout;
        let connection = ConnectionManager::new(
            connector,
            config,
            Arc::clone(&subscriptions),
            Arc::clone(&dispatcher),
        );

        Ok(Self {
            connection,
            subscriptions,
            dispatcher,
            codec: FrameCodec,
            listen_idle_timeout,
        })
    }

    // -- Lifecycle --------------------------------------------------------

    /// Opens the connection. Does nothing if already connected.
    ///
    /// # Errors
    /// Returns [`GmgnError::Connection`] if the transport cannot be
    /// opened; the client is then `Disconnected`.
    pub async fn connect(&self) -> Result<(), GmgnError> {
        self.connection.connect().await
    }

    /// Closes the connection and cancels any pending reconnect. Does
    /// nothing if already disconnected.
    ///
    /// Must not be awaited from inside a handler: handlers run on the
    /// task this call waits for. Spawn it instead.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// A receiver that observes every lifecycle state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_changes()
    }

    // -- Subscriptions ----------------------------------------------------

    /// Records a subscription and sends it.
    ///
    /// The subscription is recorded before anything is sent, so it is
    /// replayed by the next `connect()` or reconnect even when sending
    /// fails.
    ///
    /// # Errors
    /// - [`GmgnError::Subscription`] for an unsupported channel
    /// - [`GmgnError::Authentication`] for a gated channel without a token
    /// - [`GmgnError::NotConnected`] when there is no live connection
    /// - [`GmgnError::SubscribeFailed`] when the send fails
    pub async fn subscribe(
        &self,
        channel: &str,
        parameters: Vec<Map<String, Value>>,
        credential: Option<String>,
    ) -> Result<(), GmgnError> {
        let request = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe(channel, parameters, credential)?;
        let text = self.codec.encode(&request)?;

        match self.connection.send(&text).await {
            Ok(()) => {
                tracing::debug!(channel = %request.channel, id = %request.id, "subscribed");
                Ok(())
            }
            Err(GmgnError::Connection(source)) => {
                tracing::error!(channel = %request.channel, error = %source, "failed to send subscription");
                Err(GmgnError::SubscribeFailed {
                    channel: request.channel,
                    source,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Subscribes to newly created liquidity pools on `chain`.
    pub async fn subscribe_new_pools(&self, chain: &str) -> Result<(), GmgnError> {
        self.subscribe_public(Channel::NewPoolInfo, chain).await
    }

    /// Subscribes to trading pair updates on `chain`.
    pub async fn subscribe_pair_updates(&self, chain: &str) -> Result<(), GmgnError> {
        self.subscribe_public(Channel::NewPairUpdate, chain).await
    }

    /// Subscribes to token launches on `chain`.
    pub async fn subscribe_token_launches(&self, chain: &str) -> Result<(), GmgnError> {
        self.subscribe_public(Channel::NewLaunchedInfo, chain).await
    }

    /// Subscribes to chain-wide statistics for `chain`.
    pub async fn subscribe_chain_stats(&self, chain: &str) -> Result<(), GmgnError> {
        self.subscribe_public(Channel::ChainStat, chain).await
    }

    /// Subscribes to token social links on `chain`.
    pub async fn subscribe_token_social_info(&self, chain: &str) -> Result<(), GmgnError> {
        self.subscribe_public(Channel::TokenSocialInfo, chain).await
    }

    async fn subscribe_public(&self, channel: Channel, chain: &str) -> Result<(), GmgnError> {
        self.subscribe(channel.as_str(), chain_params(chain), None)
            .await
    }

    /// Subscribes to the trades of one wallet. Needs a credential,
    /// either passed here or configured on the client.
    ///
    /// # Errors
    /// [`GmgnError::Subscription`] with
    /// [`SubscriptionError::MissingParameter`](crate::SubscriptionError::MissingParameter)
    /// for an empty address,
    /// plus everything [`subscribe`](Self::subscribe) returns.
    pub async fn subscribe_wallet_trades(
        &self,
        chain: &str,
        wallet_address: &str,
        credential: Option<String>,
    ) -> Result<(), GmgnError> {
        let mut params = chain_params(chain);
        params[0].insert(
            "addresses".to_owned(),
            Value::String(wallet_address.to_owned()),
        );
        self.subscribe(Channel::WalletTradeData.as_str(), params, credential)
            .await
    }

    /// Subscribes to limit order updates. Needs a credential, either
    /// passed here or configured on the client.
    pub async fn subscribe_limit_orders(&self, credential: Option<String>) -> Result<(), GmgnError> {
        self.subscribe(Channel::LimitOrderInfo.as_str(), Vec::new(), credential)
            .await
    }

    /// Subscribes to all five public channels on `chain`, one after
    /// another.
    ///
    /// Every channel is attempted and recorded even if an earlier one
    /// fails; the first error is returned.
    pub async fn subscribe_all_channels(&self, chain: &str) -> Result<(), GmgnError> {
        let mut first_error = None;
        for channel in Channel::PUBLIC {
            if let Err(e) = self.subscribe_public(channel, chain).await {
                tracing::warn!(%channel, error = %e, "subscription failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sends every recorded subscription again. Returns how many were
    /// sent.
    ///
    /// # Errors
    /// Returns [`GmgnError::NotConnected`] without a live connection.
    pub async fn resubscribe(&self) -> Result<usize, GmgnError> {
        self.connection.resubscribe().await
    }

    /// Forgets every recorded subscription. Nothing is sent; the server
    /// keeps streaming until the connection closes.
    pub fn unsubscribe_all(&self) {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("subscriptions cleared");
    }

    /// Channels with a recorded subscription, in replay order.
    pub fn subscribed_channels(&self) -> Vec<Channel> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .all()
            .into_iter()
            .map(|r| r.channel)
            .collect()
    }

    // -- Delivery ---------------------------------------------------------

    /// Registers `handler` for envelopes on `channel`.
    ///
    /// Handlers run in addition to the delivery queue, not instead of it.
    /// The queue is unbounded: every envelope stays in memory until a
    /// [`listen`](Self::listen)er takes it. A client that only uses
    /// handlers should still drain the queue, for example with
    /// [`run_forever`](Self::run_forever).
    pub fn on(&self, channel: impl Into<String>, handler: Handler) {
        self.dispatcher.handlers().register(channel, handler);
    }

    /// Removes `handler` from `channel`, or every handler on `channel`
    /// when `handler` is `None`.
    pub fn off(&self, channel: &str, handler: Option<&Handler>) {
        self.dispatcher.handlers().unregister(channel, handler);
    }

    /// Takes the delivery queue's consumer slot.
    ///
    /// Waits while another listener is alive. The listener ends once the
    /// client is disconnected and the queue is drained.
    ///
    /// The queue is unbounded and fills from the moment the client
    /// connects, whether or not anyone listens. Envelopes received
    /// before `listen()` are kept and come out first.
    pub async fn listen(&self) -> Listener {
        self.dispatcher
            .listener(self.state_changes(), self.listen_idle_timeout)
            .await
    }

    /// Drains the delivery queue until it ends or Ctrl-C arrives, then
    /// disconnects.
    ///
    /// Use this when all processing happens in handlers.
    pub async fn run_forever(&self) -> Result<(), GmgnError> {
        let mut listener = self.listen().await;

        tokio::select! {
            () = async { while listener.next().await.is_some() {} } => {
                tracing::info!("stream ended");
            }
            () = interrupted() => {
                tracing::info!("interrupt received, shutting down");
            }
        }

        drop(listener);
        self.disconnect().await;
        Ok(())
    }

    /// Dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal can't be watched.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Builder for [`GmgnClient`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use gmgn::GmgnClient;
///
/// let client = GmgnClient::builder()
///     .endpoint("wss://gmgn.ai/ws")
///     .max_reconnect_attempts(3)
///     .base_reconnect_delay(Duration::from_secs(2))
///     .cookie("cf_clearance", "abc")
///     .build()
///     .unwrap();
/// assert!(!client.is_connected());
/// ```
pub struct GmgnClientBuilder {
    config: ClientConfig,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl GmgnClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            credentials: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the feed endpoint.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = url.into();
        self
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets a fixed access token for gated channels.
    pub fn credential(mut self, token: impl Into<String>) -> Self {
        self.config.credential = Some(token.into());
        self
    }

    /// Sets where access tokens come from. Takes precedence over
    /// [`credential`](Self::credential).
    pub fn credential_provider(mut self, provider: impl CredentialProvider) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Enables or disables automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Sets how many reconnect attempts are made before giving up.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the delay before the first reconnect attempt.
    pub fn base_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.base_reconnect_delay = delay;
        self
    }

    /// Adds one cookie.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.cookies.insert(name.into(), value.into());
        self
    }

    /// Replaces all cookies.
    pub fn cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.config.cookies = cookies;
        self
    }

    /// Sets how often an idle listener re-checks liveness.
    pub fn listen_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.listen_idle_timeout = timeout;
        self
    }

    /// Sets what happens to non-object frames.
    pub fn unexpected_frame_policy(mut self, policy: UnexpectedFramePolicy) -> Self {
        self.config.unexpected_frame_policy = policy;
        self
    }

    /// Builds a WebSocket client.
    ///
    /// # Errors
    /// Returns [`GmgnError::Config`] if the configuration is invalid.
    pub fn build(self) -> Result<GmgnClient, GmgnError> {
        self.build_with_connector(WebSocketConnector::new())
    }

    /// Builds a client on a custom [`Connector`].
    ///
    /// # Errors
    /// Returns [`GmgnError::Config`] if the configuration is invalid.
    pub fn build_with_connector<C: Connector>(self, connector: C) -> Result<GmgnClient<C>, GmgnError> {
        let credentials: Arc<dyn CredentialProvider> = match self.credentials {
            Some(provider) => provider,
            None => Arc::new(StaticCredential::from(self.config.credential.clone())),
        };
        GmgnClient::assemble(self.config, connector, credentials)
    }
}

impl Default for GmgnClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
