//! Delivery of decoded envelopes to consumers.
//!
//! Two delivery styles share one [`Dispatcher`]:
//!
//! - **Push**: [`Handler`]s registered per channel in a
//!   [`HandlerRegistry`], invoked for every matching envelope
//! - **Pull**: a [`Listener`] draining the delivery queue, which keeps
//!   every envelope regardless of handlers
//!
//! # How it fits in the stack
//!
//! ```text
//! Connection (above)  ← feeds raw frames from the receive loop
//!     ↕
//! Dispatch Layer (this crate)  ← decode, queue, invoke handlers
//!     ↕
//! Protocol Layer (below)  ← provides FrameCodec, Envelope
//! ```

mod dispatcher;
mod handler;
mod listener;
mod registry;

pub use dispatcher::{DispatchStats, Dispatcher, UnexpectedFramePolicy};
pub use handler::{Handler, HandlerError, HandlerResult};
pub use listener::{DEFAULT_IDLE_TIMEOUT, Listener};
pub use registry::HandlerRegistry;
