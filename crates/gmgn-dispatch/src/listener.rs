//! The pull side of delivery.

use std::time::Duration;

use futures_util::Stream;
use gmgn_protocol::Envelope;
use gmgn_transport::ConnectionState;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{OwnedMutexGuard, watch};

/// Default interval at which an idle listener re-checks liveness.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Exclusive consumer of the delivery queue.
///
/// Envelopes come out in arrival order. The listener keeps yielding
/// queued envelopes after the connection closes and only ends once the
/// connection is closed for good and the queue is drained. A reconnect
/// in progress does not end it.
///
/// Only one listener exists at a time; dropping it frees the slot.
#[derive(Debug)]
pub struct Listener {
    rx: OwnedMutexGuard<UnboundedReceiver<Envelope>>,
    liveness: watch::Receiver<ConnectionState>,
    idle_timeout: Duration,
}

impl Listener {
    pub(crate) fn new(
        rx: OwnedMutexGuard<UnboundedReceiver<Envelope>>,
        liveness: watch::Receiver<ConnectionState>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            rx,
            liveness,
            idle_timeout,
        }
    }

    /// The next envelope, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => {}
            }

            let state = *self.liveness.borrow();
            if state.is_closed() {
                tracing::debug!(%state, "listener finished");
                return None;
            }

            match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                Ok(Some(envelope)) => return Some(envelope),
                Ok(None) => return None,
                Err(_elapsed) => continue,
            }
        }
    }

    /// Adapts the listener into a [`Stream`] of envelopes.
    pub fn into_stream(self) -> impl Stream<Item = Envelope> + Send {
        futures_util::stream::unfold(self, |mut listener| async move {
            let envelope = listener.next().await?;
            Some((envelope, listener))
        })
    }
}
