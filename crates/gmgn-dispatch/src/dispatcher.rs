//! The dispatcher: turns inbound frames into deliveries.
//!
//! Every decoded envelope goes two places, in this order:
//!
//! 1. the **delivery queue**, drained by a [`Listener`]
//! 2. every **handler** registered for the envelope's channel, one after
//!    another, in registration order
//!
//! Faults stay local. A handler that errors or panics is logged and
//! counted, and the next handler still runs. A frame that fails to
//! decode is logged and skipped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use gmgn_protocol::{Decoded, Envelope, FrameCodec};
use gmgn_transport::ConnectionState;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};

use crate::{HandlerRegistry, Listener};

/// What to do with a frame that is valid JSON but not an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedFramePolicy {
    /// Log a warning and drop the frame.
    #[default]
    Drop,
    /// Deliver it as an envelope on the `"unknown"` channel with the
    /// whole value as payload.
    Deliver,
}

/// Snapshot of the dispatcher's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Envelopes pushed to the delivery queue.
    pub delivered: u64,
    /// Acknowledgement frames dropped.
    pub dropped_acks: u64,
    /// Non-object frames dropped under [`UnexpectedFramePolicy::Drop`].
    pub dropped_unexpected: u64,
    /// Frames that were not valid JSON.
    pub malformed: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_faults: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped_acks: AtomicU64,
    dropped_unexpected: AtomicU64,
    malformed: AtomicU64,
    handler_faults: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Decodes inbound frames and fans envelopes out to the queue and the
/// registered handlers.
#[derive(Debug)]
pub struct Dispatcher {
    codec: FrameCodec,
    policy: UnexpectedFramePolicy,
    handlers: HandlerRegistry,
    queue_tx: mpsc::UnboundedSender<Envelope>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Envelope>>>,
    counters: Counters,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty handler registry and queue.
    pub fn new(policy: UnexpectedFramePolicy) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            codec: FrameCodec,
            policy,
            handlers: HandlerRegistry::new(),
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            counters: Counters::default(),
        }
    }

    /// The handler registry this dispatcher invokes.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Decodes one raw frame and dispatches the result.
    ///
    /// Never fails: malformed frames, acknowledgements and handler
    /// faults are logged and counted.
    pub async fn handle_frame(&self, frame: &[u8]) {
        match self.codec.decode(frame) {
            Ok(Decoded::Envelope(envelope)) => self.dispatch(envelope).await,
            Ok(Decoded::Ack(ack)) => {
                bump(&self.counters.dropped_acks);
                tracing::debug!(%ack, "acknowledgement dropped");
            }
            Ok(Decoded::Unexpected(value)) => self.handle_unexpected(value).await,
            Err(e) => {
                bump(&self.counters.malformed);
                tracing::warn!(error = %e, len = frame.len(), "failed to decode frame");
            }
        }
    }

    async fn handle_unexpected(&self, value: Value) {
        match self.policy {
            UnexpectedFramePolicy::Drop => {
                bump(&self.counters.dropped_unexpected);
                tracing::warn!(%value, "non-object frame dropped");
            }
            UnexpectedFramePolicy::Deliver => {
                let envelope = self.codec.wrap_unexpected(value);
                self.dispatch(envelope).await;
            }
        }
    }

    /// Queues `envelope`, then runs every handler for its channel.
    ///
    /// The queue push happens first so a consumer sees the envelope even
    /// if a handler is slow. Handlers run sequentially; each gets its own
    /// clone of the payload.
    pub async fn dispatch(&self, envelope: Envelope) {
        let channel = envelope.channel.clone();
        let payload = envelope.payload.clone();

        if self.queue_tx.send(envelope).is_ok() {
            bump(&self.counters.delivered);
        }

        let handlers = self.handlers.snapshot(&channel);
        for (index, handler) in handlers.iter().enumerate() {
            let call = AssertUnwindSafe(async { handler.call(payload.clone()).await });
            match call.catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    bump(&self.counters.handler_faults);
                    tracing::warn!(%channel, index, error = %e, "handler failed");
                }
                Err(_panic) => {
                    bump(&self.counters.handler_faults);
                    tracing::error!(%channel, index, "handler panicked");
                }
            }
        }
    }

    /// Takes the single consumer slot of the delivery queue.
    ///
    /// Waits while another [`Listener`] is alive. `liveness` tells the
    /// listener when the connection is closed for good; `idle_timeout` is
    /// how often it re-checks while the queue is empty.
    pub async fn listener(
        &self,
        liveness: watch::Receiver<ConnectionState>,
        idle_timeout: Duration,
    ) -> Listener {
        let rx = self.queue_rx.clone().lock_owned().await;
        Listener::new(rx, liveness, idle_timeout)
    }

    /// Current counter values.
    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped_acks: c.dropped_acks.load(Ordering::Relaxed),
            dropped_unexpected: c.dropped_unexpected.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            handler_faults: c.handler_faults.load(Ordering::Relaxed),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(UnexpectedFramePolicy::default())
    }
}
