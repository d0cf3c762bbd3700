//! Watches new liquidity pools and chain stats on one chain.
//!
//! ```text
//! RUST_LOG=info,gmgn=debug cargo run -p pool-monitor -- sol
//! ```
//!
//! Configuration comes from the environment (`GMGN_WS_URL`,
//! `GMGN_USER_AGENT`, `GMGN_ACCESS_TOKEN`). Ctrl-C stops it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gmgn::prelude::*;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Payload summaries
// ---------------------------------------------------------------------------

/// One-line summary of a `new_pool_info` payload. Payloads come either
/// as a single pool object or as a list of them.
fn describe_pools(payload: &Value) -> Vec<String> {
    let pools = match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    pools
        .into_iter()
        .map(|pool| {
            let field = |key: &str| pool.get(key).and_then(Value::as_str).unwrap_or("?");
            format!("{} on {} ({})", field("pool_address"), field("chain"), field("exchange"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let chain = std::env::args().nth(1).unwrap_or_else(|| gmgn::DEFAULT_CHAIN.to_owned());
    let client = GmgnClient::new(ClientConfig::from_env())?;

    let pools_seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&pools_seen);
    client.on(
        Channel::NewPoolInfo.as_str(),
        Handler::sync(move |payload| {
            for line in describe_pools(&payload) {
                counter.fetch_add(1, Ordering::Relaxed);
                tracing::info!(pool = %line, "new pool");
            }
            Ok(())
        }),
    );
    client.on(
        Channel::ChainStat.as_str(),
        Handler::sync(|payload| {
            tracing::debug!(%payload, "chain stats");
            Ok(())
        }),
    );

    client.connect().await?;
    client.subscribe_new_pools(&chain).await?;
    client.subscribe_chain_stats(&chain).await?;
    tracing::info!(%chain, "monitoring; press Ctrl-C to stop");

    client.run_forever().await?;

    let stats = client.stats();
    tracing::info!(
        pools = pools_seen.load(Ordering::Relaxed),
        delivered = stats.delivered,
        malformed = stats.malformed,
        handler_faults = stats.handler_faults,
        "stopped"
    );
    Ok(())
}
