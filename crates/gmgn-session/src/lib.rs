//! Subscription state for the GMGN stream client.
//!
//! This crate remembers what the client is subscribed to:
//!
//! 1. **Registry**: the latest [`SubscriptionRequest`] per channel
//!    ([`SubscriptionRegistry`]), replayed after every reconnect
//! 2. **Credentials**: where access tokens for gated channels come from
//!    ([`CredentialProvider`] trait)
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)  ← records subscriptions here, replays them on reconnect
//!     ↕
//! Session Layer (this crate)  ← desired subscription state
//!     ↕
//! Protocol Layer (below)  ← provides Channel, SubscriptionRequest
//! ```
//!
//! [`SubscriptionRequest`]: gmgn_protocol::SubscriptionRequest

mod credential;
mod error;
mod registry;

pub use credential::{CredentialProvider, StaticCredential};
pub use error::SubscriptionError;
pub use registry::SubscriptionRegistry;
