//! # gmgn
//!
//! Streaming client for the GMGN publish/subscribe feed.
//!
//! The client keeps one logical subscription session alive over a
//! WebSocket: it reconnects with exponential backoff when the socket
//! drops, replays every subscription on the new socket, and delivers
//! decoded [`Envelope`](gmgn_protocol::Envelope)s both to per-channel
//! [`Handler`](gmgn_dispatch::Handler)s and to a pull-style
//! [`Listener`](gmgn_dispatch::Listener).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gmgn::prelude::*;
//!
//! # async fn run() -> Result<(), GmgnError> {
//! let client = GmgnClient::new(ClientConfig::from_env())?;
//! client.connect().await?;
//! client.subscribe_all_channels("sol").await?;
//!
//! let mut listener = client.listen().await;
//! while let Some(envelope) = listener.next().await {
//!     println!("{}: {}", envelope.channel, envelope.payload);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate | Role |
//! |---|---|
//! | `gmgn-transport` | Opening the socket, raw frames in and out |
//! | `gmgn-protocol` | Channels, subscribe requests, envelope decoding |
//! | `gmgn-session` | Subscription registry, credentials |
//! | `gmgn-dispatch` | Handlers, delivery queue, listener |
//! | `gmgn` (this crate) | Connection lifecycle and the public facade |

mod client;
mod config;
mod connection;
mod error;

pub use client::{DEFAULT_CHAIN, GmgnClient, GmgnClientBuilder};
pub use config::{
    ClientConfig, DEFAULT_APP_VERSION, DEFAULT_ENDPOINT, DEFAULT_USER_AGENT,
    ENV_ACCESS_TOKEN, ENV_USER_AGENT, ENV_WS_URL,
};
pub use error::GmgnError;

pub use gmgn_dispatch::{
    DispatchStats, Handler, HandlerError, HandlerResult, Listener, UnexpectedFramePolicy,
};
pub use gmgn_protocol::{Channel, Envelope, SubscriptionRequest};
pub use gmgn_session::{CredentialProvider, StaticCredential, SubscriptionError};
pub use gmgn_transport::{
    ConnectRequest, Connection, ConnectionId, ConnectionState, Connector, TransportError,
};

/// Everything most programs need, in one import.
pub mod prelude {
    pub use crate::{
        Channel, ClientConfig, ConnectionState, DispatchStats, Envelope, GmgnClient,
        GmgnClientBuilder, GmgnError, Handler, HandlerResult, Listener,
    };
}
