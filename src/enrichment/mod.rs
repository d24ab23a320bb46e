//! Periodic REST poll for mcap/liquidity/tx-counts per tracked token.
//! Scheduling state (`next_fetch_at` per token) is kept local to this task
//! rather than on `TokenState`: the tracker holds facts about a token, not
//! scheduling, so a restart of this task alone can't desync what the tracker
//! believes is true.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::EnrichmentError;
use crate::signal::SignalEngine;
use crate::tracker::TokenTracker;
use crate::types::SignalRecord;

/// One pair entry from the provider's response array. Only the fields the
/// signal engine and honeypot check actually need are deserialized;
/// everything else is ignored.
#[derive(Debug, Deserialize)]
pub struct PairData {
    pub fdv: Option<f64>,
    #[serde(rename = "marketCap")]
    pub market_cap: Option<f64>,
    pub liquidity: Option<Liquidity>,
    pub txns: Option<Txns>,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Txns {
    pub h1: Option<TxnCounts>,
}

#[derive(Debug, Deserialize)]
pub struct TxnCounts {
    pub buys: Option<u64>,
    pub sells: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PairsResponse {
    pairs: Option<Vec<PairData>>,
}

impl PairData {
    pub fn mcap_usd(&self) -> Option<f64> {
        self.fdv.or(self.market_cap)
    }

    pub fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }

    pub fn buys_h1(&self) -> Option<u64> {
        self.txns.as_ref().and_then(|t| t.h1.as_ref()).and_then(|c| c.buys)
    }

    pub fn sells_h1(&self) -> Option<u64> {
        self.txns.as_ref().and_then(|t| t.h1.as_ref()).and_then(|c| c.sells)
    }
}

/// `GET /tokens/v1/{chain}/{token_address}`, returning an array of pair
/// objects. Some providers wrap the array in `{"pairs": [...]}`; both shapes
/// are accepted.
pub async fn fetch_pairs(
    client: &reqwest::Client,
    base_url: &str,
    chain_slug: &str,
    token: Address,
) -> Result<Vec<PairData>, EnrichmentError> {
    let url = format!("{base_url}/tokens/v1/{chain_slug}/{token:#x}");
    let response = client.get(&url).send().await?;
    let status = response.status();
    if status.is_client_error() {
        return Err(EnrichmentError::ClientError(status.as_u16()));
    }
    if status.is_server_error() {
        return Err(EnrichmentError::ServerError(status.as_u16()));
    }
    let body = response.text().await?;
    if let Ok(pairs) = serde_json::from_str::<Vec<PairData>>(&body) {
        return Ok(pairs);
    }
    serde_json::from_str::<PairsResponse>(&body)
        .map(|r| r.pairs.unwrap_or_default())
        .map_err(|e| EnrichmentError::MalformedResponse(e.to_string()))
}

/// The largest pair by reported USD liquidity.
pub fn best_pair(pairs: &[PairData]) -> Option<&PairData> {
    pairs
        .iter()
        .max_by(|a, b| {
            a.liquidity_usd()
                .unwrap_or(0.0)
                .partial_cmp(&b.liquidity_usd().unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

const MAX_RETRIES: u32 = 2;
const DEFER_ON_CLIENT_ERROR: Duration = Duration::from_secs(30);

pub struct EnrichmentFetcher {
    client: reqwest::Client,
    config: Arc<AppConfig>,
    tracker: TokenTracker,
    signal_engine: Arc<SignalEngine>,
    out_tx: mpsc::Sender<SignalRecord>,
}

impl EnrichmentFetcher {
    pub fn new(
        config: Arc<AppConfig>,
        tracker: TokenTracker,
        signal_engine: Arc<SignalEngine>,
        out_tx: mpsc::Sender<SignalRecord>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            tracker,
            signal_engine,
            out_tx,
        }
    }

    /// Drives the per-token polling loop, bounded by a concurrency-cap
    /// semaphore. Each token has its own next-fetch deadline rather than a
    /// single global tick, so a token that just started won't wait behind
    /// one that's mid-cycle.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let semaphore = Arc::new(Semaphore::new(self.config.enrichment_concurrency));
        let mut next_fetch_at: HashMap<Address, Instant> = HashMap::new();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => return,
            }

            let now = Instant::now();
            let active = self.tracker.iter_active().await;
            for token in active {
                let due = next_fetch_at
                    .get(&token.token_address)
                    .is_none_or(|deadline| *deadline <= now);
                if !due {
                    continue;
                }
                next_fetch_at.insert(token.token_address, now + self.config.enrichment_poll_interval);

                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    continue; // at concurrency cap; try again next tick
                };
                let this = Arc::clone(&self);
                let token_address = token.token_address;
                tokio::spawn(async move {
                    let _permit = permit;
                    this.poll_one(token_address).await;
                });
            }
        }
    }

    async fn poll_one(&self, token: Address) {
        let deadline = tokio::time::Instant::now() + self.config.enrichment_poll_interval;
        let mut attempt = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            let result = tokio::time::timeout(
                remaining,
                fetch_pairs(&self.client, &self.config.enrichment_base_url, &self.config.chain_slug, token),
            )
            .await;

            match result {
                Ok(Ok(pairs)) => {
                    self.apply(token, &pairs).await;
                    return;
                }
                Ok(Err(EnrichmentError::ClientError(status))) => {
                    debug!(%token, status, "enrichment deferred after client error");
                    tokio::time::sleep(DEFER_ON_CLIENT_ERROR.min(remaining)).await;
                    return;
                }
                Ok(Err(e)) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    debug!(%token, error = %e, attempt, "retrying enrichment fetch within budget");
                    tokio::time::sleep(Duration::from_millis(250 * attempt as u64).min(remaining)).await;
                }
                Ok(Err(e)) => {
                    warn!(%token, error = %e, "enrichment fetch exhausted retries");
                    return;
                }
                Err(_) => return, // timed out inside the 8s budget
            }
        }
    }

    async fn apply(&self, token: Address, pairs: &[PairData]) {
        let Some(pair) = best_pair(pairs) else {
            return;
        };

        let now = crate::now_secs();
        let mut became_honeypot = false;

        self.tracker
            .mutate(token, |state| {
                if let Some(mcap) = pair.mcap_usd() {
                    state.update_estimated_mcap(mcap);
                }
                if let Some(liquidity) = pair.liquidity_usd() {
                    state.update_liquidity_usd(liquidity);
                }
                state.mark_enriched(now);

                let buys = pair.buys_h1().unwrap_or(0);
                let sells = pair.sells_h1().unwrap_or(0);
                if sells == 0 && buys > 5 {
                    state.mark_honeypot_suspected();
                    became_honeypot = true;
                }
            })
            .await;

        if became_honeypot {
            debug!(%token, "enrichment flagged honeypot: sells=0, buys>5");
        }
        self.signal_engine.evaluate_and_emit(&self.tracker, &self.out_tx, token, now).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(liquidity: f64) -> PairData {
        PairData {
            fdv: Some(10_000.0),
            market_cap: None,
            liquidity: Some(Liquidity { usd: Some(liquidity) }),
            txns: None,
            price_usd: None,
        }
    }

    #[test]
    fn best_pair_picks_largest_liquidity() {
        let pairs = vec![pair(100.0), pair(5_000.0), pair(900.0)];
        let best = best_pair(&pairs).unwrap();
        assert_eq!(best.liquidity_usd(), Some(5_000.0));
    }

    #[test]
    fn best_pair_of_empty_list_is_none() {
        assert!(best_pair(&[]).is_none());
    }

    #[test]
    fn mcap_prefers_fdv_over_market_cap() {
        let pair = PairData {
            fdv: Some(1.0),
            market_cap: Some(2.0),
            liquidity: None,
            txns: None,
            price_usd: None,
        };
        assert_eq!(pair.mcap_usd(), Some(1.0));
    }
}
