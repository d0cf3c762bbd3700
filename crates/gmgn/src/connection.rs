//! Connection lifecycle: open, receive, reconnect, replay, close.
//!
//! One [`ConnectionManager`] owns the client's single logical
//! connection. While a session is live, exactly one background task
//! (the *supervisor*) exists for it. The supervisor runs the receive
//! loop, and when the transport drops it runs the reconnect procedure
//! itself before resuming the loop on the new transport.
//!
//! ```text
//! connect() ──→ spawn supervisor
//!                   │
//!                   ▼
//!            receive loop ──(frame)──→ Dispatcher
//!                   │
//!            (transport dropped)
//!                   ▼
//!     sleep base·2^(n-1) → open(reconnect=1) ──ok──→ replay → receive loop
//!                   │
//!            (attempts exhausted) ──→ Disconnected
//! ```
//!
//! # Locking
//!
//! `connect`, `disconnect`, `send` and the supervisor's state changes
//! all go through one `tokio::sync::Mutex`. The supervisor never holds
//! it while sleeping or while waiting for a frame, so an explicit
//! `disconnect()` always gets in, aborts the supervisor and closes the
//! transport.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use gmgn_dispatch::Dispatcher;
use gmgn_protocol::FrameCodec;
use gmgn_session::SubscriptionRegistry;
use gmgn_transport::{Connection, ConnectionState, Connector};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::{ClientConfig, GmgnError};

/// Mutable connection state guarded by the manager's lock.
struct Inner<T> {
    conn: Option<Arc<T>>,
    task: Option<JoinHandle<()>>,
    attempts: u32,
}

struct Shared<C: Connector> {
    connector: C,
    config: ClientConfig,
    codec: FrameCodec,
    inner: Mutex<Inner<C::Connection>>,
    state: watch::Sender<ConnectionState>,
    subscriptions: Arc<StdMutex<SubscriptionRegistry>>,
    dispatcher: Arc<Dispatcher>,
}

/// Owns the transport and the background task of one client.
pub(crate) struct ConnectionManager<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based):
/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

impl<C: Connector> ConnectionManager<C> {
    pub(crate) fn new(
        connector: C,
        config: ClientConfig,
        subscriptions: Arc<StdMutex<SubscriptionRegistry>>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                codec: FrameCodec,
                inner: Mutex::new(Inner {
                    conn: None,
                    task: None,
                    attempts: 0,
                }),
                state,
                subscriptions,
                dispatcher,
            }),
        }
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// A receiver that observes every state change.
    pub(crate) fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Opens the transport, replays any recorded subscriptions and starts
    /// the supervisor.
    ///
    /// Does nothing when already connected. Takes over a pending
    /// reconnect: the reconnect task is cancelled and the transport is
    /// opened with `reconnect=1`.
    pub(crate) async fn connect(&self) -> Result<(), GmgnError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        let previous = self.state();
        if previous == ConnectionState::Connected {
            tracing::debug!("already connected");
            return Ok(());
        }
        let took_over = previous == ConnectionState::Reconnecting;
        if let Some(task) = inner.task.take() {
            stop_task(task).await;
        }
        if let Some(stale) = inner.conn.take() {
            close_logged(&*stale).await;
        }

        shared.set_state(ConnectionState::Connecting);
        tracing::info!(
            endpoint = %shared.config.endpoint_url,
            client = %shared.config.client_id,
            "connecting"
        );

        let opened = match shared.config.connect_request(took_over) {
            Ok(request) => shared.connector.connect(&request).await,
            Err(e) => Err(e),
        };
        let conn = match opened {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                tracing::error!(error = %e, "failed to connect");
                return Err(GmgnError::Connection(e));
            }
        };

        inner.attempts = 0;
        inner.conn = Some(Arc::clone(&conn));
        if shared.has_subscriptions() {
            shared.replay(&conn).await;
        }
        shared.set_state(ConnectionState::Connected);
        inner.task = Some(tokio::spawn(supervise(Arc::clone(shared), conn)));
        tracing::info!("connected");

        Ok(())
    }

    /// Stops the supervisor and closes the transport.
    ///
    /// Does nothing when already disconnected. Also cancels a pending
    /// reconnect.
    pub(crate) async fn disconnect(&self) {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;

        if self.state() == ConnectionState::Disconnected {
            // A supervisor that gave up may have left its finished handle.
            inner.task = None;
            return;
        }

        shared.set_state(ConnectionState::Closing);
        if let Some(task) = inner.task.take() {
            stop_task(task).await;
        }
        if let Some(conn) = inner.conn.take() {
            close_logged(&*conn).await;
        }
        inner.attempts = 0;
        shared.set_state(ConnectionState::Disconnected);
        tracing::info!("disconnected");
    }

    /// Sends one text frame on the live transport.
    ///
    /// # Errors
    /// [`GmgnError::NotConnected`] without a transport,
    /// [`GmgnError::Connection`] if the send fails.
    pub(crate) async fn send(&self, text: &str) -> Result<(), GmgnError> {
        let conn = self
            .shared
            .inner
            .lock()
            .await
            .conn
            .clone()
            .ok_or(GmgnError::NotConnected)?;
        conn.send(text).await?;
        Ok(())
    }

    /// Replays every recorded subscription on the live transport.
    pub(crate) async fn resubscribe(&self) -> Result<usize, GmgnError> {
        let inner = self.shared.inner.lock().await;
        let conn = inner.conn.as_ref().ok_or(GmgnError::NotConnected)?;
        Ok(self.shared.replay(conn).await)
    }
}

impl<C: Connector> Shared<C> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn has_subscriptions(&self) -> bool {
        !self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Sends every registry entry in order. Failures are logged and the
    /// remaining entries are still attempted. Returns how many were sent.
    async fn replay(&self, conn: &C::Connection) -> usize {
        let requests = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .all();

        let mut sent = 0;
        for request in &requests {
            let result = match self.codec.encode(request) {
                Ok(text) => conn.send(&text).await.map_err(GmgnError::from),
                Err(e) => Err(GmgnError::from(e)),
            };
            match result {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    channel = %request.channel,
                    error = %e,
                    "failed to replay subscription"
                ),
            }
        }
        tracing::info!(sent, total = requests.len(), "subscriptions replayed");
        sent
    }

    /// Reads frames until the transport closes or faults.
    async fn receive_loop(&self, conn: &C::Connection) {
        let id = conn.id();
        loop {
            match conn.recv().await {
                Ok(Some(frame)) => self.dispatcher.handle_frame(&frame).await,
                Ok(None) => {
                    tracing::info!(%id, "connection closed by server");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%id, error = %e, "connection lost");
                    return;
                }
            }
        }
    }

    /// Re-opens the transport with exponential backoff.
    ///
    /// Returns the new connection with the registry already replayed, or
    /// `None` after giving up (state is then `Disconnected`).
    async fn reconnect(&self) -> Option<Arc<C::Connection>> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(dropped) = inner.conn.take() {
                close_logged(&*dropped).await;
            }
            self.set_state(ConnectionState::Reconnecting);
        }

        let max = self.config.max_reconnect_attempts;
        loop {
            let attempt = {
                let mut inner = self.inner.lock().await;
                if inner.attempts >= max {
                    tracing::error!(attempts = inner.attempts, "reconnection attempts exhausted");
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
                inner.attempts += 1;
                inner.attempts
            };

            let delay = backoff_delay(self.config.base_reconnect_delay, attempt);
            tracing::info!(attempt, max, ?delay, "reconnecting");
            tokio::time::sleep(delay).await;

            let request = match self.config.connect_request(true) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!(error = %e, "cannot build reconnect request");
                    self.set_state(ConnectionState::Disconnected);
                    return None;
                }
            };
            match self.connector.connect(&request).await {
                Ok(conn) => {
                    let conn = Arc::new(conn);
                    let mut inner = self.inner.lock().await;
                    inner.attempts = 0;
                    inner.conn = Some(Arc::clone(&conn));
                    self.replay(&conn).await;
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(attempt, "reconnected");
                    return Some(conn);
                }
                Err(e) => {
                    tracing::warn!(attempt, max, error = %e, "reconnection attempt failed");
                }
            }
        }
    }
}

/// Aborts the supervisor and waits for it to finish. Cancellation is
/// expected; a panic is logged.
async fn stop_task(task: JoinHandle<()>) {
    task.abort();
    match task.await {
        Err(e) if e.is_panic() => tracing::error!("connection task panicked"),
        _ => {}
    }
}

async fn close_logged<T: Connection>(conn: &T) {
    if let Err(e) = conn.close().await {
        tracing::debug!(id = %conn.id(), error = %e, "error closing connection");
    }
}

/// Body of the background task: receive, and on a drop either reconnect
/// or settle into `Disconnected`.
async fn supervise<C: Connector>(shared: Arc<Shared<C>>, mut conn: Arc<C::Connection>) {
    loop {
        shared.receive_loop(&conn).await;

        if !shared.config.auto_reconnect {
            let mut inner = shared.inner.lock().await;
            if let Some(dropped) = inner.conn.take() {
                close_logged(&*dropped).await;
            }
            shared.set_state(ConnectionState::Disconnected);
            return;
        }

        match shared.reconnect().await {
            Some(next) => conn = next,
            None => return,
        }
    }
}
