//! Shared USD price of the chain's native (wrapped) asset, needed by the V3
//! and V4 listeners to turn a swap's native-side notional into a USD value
//! at the moment the swap arrives, before the enrichment fetcher has ever
//! touched that token. An `Arc`-wrapped lock owned by the runtime entry
//! point, never a process-global.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::enrichment::{best_pair, fetch_pairs};

pub struct NativePriceFeed {
    current: RwLock<f64>,
}

impl NativePriceFeed {
    pub fn new(initial: f64) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub async fn get(&self) -> f64 {
        *self.current.read().await
    }

    /// Ignores non-positive readings so a malformed upstream response can
    /// never zero out every mcap/liquidity estimate downstream.
    pub async fn set(&self, value: f64) {
        if value > 0.0 {
            *self.current.write().await = value;
        }
    }
}

/// Refreshes the native-token USD price by querying the same enrichment
/// endpoint for WETH's own best-liquidity pair, reusing its `priceUsd`
/// field rather than standing up a second external price source.
pub async fn run_poller(
    feed: Arc<NativePriceFeed>,
    client: reqwest::Client,
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.native_price_poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => return,
        }

        match fetch_pairs(&client, &config.enrichment_base_url, &config.chain_slug, config.weth_address).await {
            Ok(pairs) => {
                if let Some(price) = best_pair(&pairs).and_then(|p| p.price_usd.as_ref()).and_then(|s| s.parse::<f64>().ok()) {
                    feed.set(price).await;
                    debug!(price, "refreshed native USD price");
                }
            }
            Err(e) => warn!(error = %e, "native price refresh failed, keeping previous value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_ignores_non_positive_values() {
        let feed = NativePriceFeed::new(3000.0);
        feed.set(-5.0).await;
        feed.set(0.0).await;
        assert_eq!(feed.get().await, 3000.0);
        feed.set(3100.0).await;
        assert_eq!(feed.get().await, 3100.0);
    }
}
