//! Wire protocol for the GMGN stream client.
//!
//! This crate defines what travels over the socket:
//!
//! - **Types** ([`Channel`], [`SubscriptionRequest`], [`Envelope`]):
//!   the outbound request and the decoded inbound unit.
//! - **Codec** ([`FrameCodec`]): JSON text out, classified frames in.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and dispatch
//! (handlers and the delivery queue). It doesn't know about connections
//! or consumers.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Dispatch (handlers, queue)
//! ```

mod codec;
mod error;
mod types;

pub use codec::FrameCodec;
pub use error::ProtocolError;
pub use types::{
    ACK_CHANNEL, Channel, Decoded, Envelope, SubscriptionRequest,
    UNKNOWN_CHANNEL, generate_request_id,
};
