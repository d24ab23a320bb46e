pub mod events;
pub mod resolve;

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::rpc::types::eth::Filter;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client as HttpClient, Http};
use eyre::Result;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DecodeError;
use events::{V3PoolCreated, V3Swap, V4Initialize, V4Swap};

/// One-shot HTTP RPC transport, used for `get_code`, `get_block_by_number`
/// and transaction/receipt lookups. Kept separate from the WS subscription
/// transport so a burst of one-shot calls never competes with the
/// subscription stream for the same connection.
pub type HttpProvider = RootProvider<Http<HttpClient>>;

/// A decoded, typed log event attributed to one of the four subscriptions,
/// tagged with enough metadata (address, block number) for the listeners to
/// do their work without re-touching the raw log.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    V4Initialize {
        pool_manager: Address,
        block_number: u64,
        tx_hash: alloy::primitives::B256,
        event: V4Initialize,
    },
    V4Swap {
        pool_manager: Address,
        block_number: u64,
        event: V4Swap,
    },
    V3PoolCreated {
        factory: Address,
        block_number: u64,
        tx_hash: alloy::primitives::B256,
        event: V3PoolCreated,
    },
    V3Swap {
        pool_address: Address,
        block_number: u64,
        event: V3Swap,
    },
}

/// Maintains the persistent bidirectional subscription stream to the chain
/// and a separate one-shot HTTP client.
pub struct ChainClient {
    ws_url: String,
    http_provider: Arc<HttpProvider>,
    pool_manager: Address,
    factory: Address,
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// A connection that stayed up at least this long is treated as healthy:
/// the next reconnect attempt after it drops starts from `INITIAL_BACKOFF`
/// again instead of carrying forward whatever the backoff had climbed to.
const BACKOFF_RESET_AFTER: Duration = Duration::from_secs(60);

impl ChainClient {
    pub fn new(ws_url: &str, http_url: &str, pool_manager: Address, factory: Address) -> Result<Self> {
        let http_provider = Arc::new(ProviderBuilder::new().on_http(http_url.parse()?));
        Ok(Self {
            ws_url: ws_url.to_string(),
            http_provider,
            pool_manager,
            factory,
        })
    }

    pub fn http(&self) -> Arc<HttpProvider> {
        Arc::clone(&self.http_provider)
    }

    /// Runs the subscribe-decode-dispatch loop until `shutdown` fires.
    /// Reconnects with exponential backoff (1s initial, 30s cap) on stream
    /// termination, re-registering all four subscriptions; events observed
    /// during the gap are simply gone, no replay is attempted.
    pub async fn run(&self, tx: mpsc::Sender<ChainEvent>, shutdown: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            match self.run_once(&tx, &shutdown).await {
                Ok(uptime) => {
                    info!(?uptime, "chain subscription stream ended");
                    if uptime >= BACKOFF_RESET_AFTER {
                        backoff = INITIAL_BACKOFF;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "chain subscription stream failed");
                }
            }

            if shutdown.is_cancelled() {
                return;
            }

            warn!(delay = ?backoff, "reconnecting to chain endpoint");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.cancelled() => return,
            }
            backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
        }
    }

    /// Returns how long the connection stayed up before ending, so `run`
    /// can decide whether to reset the backoff.
    async fn run_once(&self, tx: &mpsc::Sender<ChainEvent>, shutdown: &CancellationToken) -> Result<Duration> {
        let connected_at = Instant::now();
        let ws = WsConnect::new(self.ws_url.clone());
        let provider: Arc<dyn Provider<PubSubFrontend>> =
            Arc::new(ProviderBuilder::new().on_ws(ws).await?);

        let v4_init_filter = Filter::new()
            .address(self.pool_manager)
            .event_signature(V4Initialize::SIGNATURE_HASH);
        let v4_swap_filter = Filter::new()
            .address(self.pool_manager)
            .event_signature(V4Swap::SIGNATURE_HASH);
        let v3_created_filter = Filter::new()
            .address(self.factory)
            .event_signature(V3PoolCreated::SIGNATURE_HASH);
        // Unfiltered by address: V3 swaps come from any pool, so membership
        // is checked in-process by the V3 listener instead.
        let v3_swap_filter = Filter::new().event_signature(V3Swap::SIGNATURE_HASH);

        let v4_init_sub = provider.subscribe_logs(&v4_init_filter).await?.into_stream();
        let v4_swap_sub = provider.subscribe_logs(&v4_swap_filter).await?.into_stream();
        let v3_created_sub = provider.subscribe_logs(&v3_created_filter).await?.into_stream();
        let v3_swap_sub = provider.subscribe_logs(&v3_swap_filter).await?.into_stream();

        info!("subscribed to all four chain topics");

        let pool_manager = self.pool_manager;
        let factory = self.factory;

        let v4_init_stream = v4_init_sub.filter_map(move |log| {
            let pool_manager = pool_manager;
            async move { decode_v4_initialize(log, pool_manager) }
        });
        let v4_swap_stream = v4_swap_sub.filter_map(move |log| {
            let pool_manager = pool_manager;
            async move { decode_v4_swap(log, pool_manager) }
        });
        let v3_created_stream = v3_created_sub.filter_map(move |log| {
            let factory = factory;
            async move { decode_v3_pool_created(log, factory) }
        });
        let v3_swap_stream = v3_swap_sub.filter_map(|log| async move { decode_v3_swap(log) });

        let mut merged = stream::select_all(vec![
            v4_init_stream.boxed(),
            v4_swap_stream.boxed(),
            v3_created_stream.boxed(),
            v3_swap_stream.boxed(),
        ]);

        loop {
            tokio::select! {
                maybe_event = merged.next() => {
                    match maybe_event {
                        Some(event) => {
                            if tx.send(event).await.is_err() {
                                debug!("event channel closed, stopping chain client");
                                return Ok(connected_at.elapsed());
                            }
                        }
                        None => return Ok(connected_at.elapsed()),
                    }
                }
                _ = shutdown.cancelled() => return Ok(connected_at.elapsed()),
            }
        }
    }
}

fn decode_v4_initialize(log: alloy::rpc::types::eth::Log, pool_manager: Address) -> Option<ChainEvent> {
    match try_decode_v4_initialize(log, pool_manager) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "failed to decode V4 Initialize log");
            None
        }
    }
}

fn try_decode_v4_initialize(
    log: alloy::rpc::types::eth::Log,
    pool_manager: Address,
) -> Result<ChainEvent, DecodeError> {
    let block_number = log.block_number.ok_or(DecodeError::MissingMetadata("block_number"))?;
    let tx_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingMetadata("transaction_hash"))?;
    let decoded = log
        .log_decode::<V4Initialize>()
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(ChainEvent::V4Initialize {
        pool_manager,
        block_number,
        tx_hash,
        event: decoded.inner.data,
    })
}

fn decode_v4_swap(log: alloy::rpc::types::eth::Log, pool_manager: Address) -> Option<ChainEvent> {
    match try_decode_v4_swap(log, pool_manager) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "failed to decode V4 Swap log");
            None
        }
    }
}

fn try_decode_v4_swap(log: alloy::rpc::types::eth::Log, pool_manager: Address) -> Result<ChainEvent, DecodeError> {
    let block_number = log.block_number.ok_or(DecodeError::MissingMetadata("block_number"))?;
    let decoded = log
        .log_decode::<V4Swap>()
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(ChainEvent::V4Swap {
        pool_manager,
        block_number,
        event: decoded.inner.data,
    })
}

fn decode_v3_pool_created(log: alloy::rpc::types::eth::Log, factory: Address) -> Option<ChainEvent> {
    match try_decode_v3_pool_created(log, factory) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "failed to decode V3 PoolCreated log");
            None
        }
    }
}

fn try_decode_v3_pool_created(
    log: alloy::rpc::types::eth::Log,
    factory: Address,
) -> Result<ChainEvent, DecodeError> {
    let block_number = log.block_number.ok_or(DecodeError::MissingMetadata("block_number"))?;
    let tx_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingMetadata("transaction_hash"))?;
    let decoded = log
        .log_decode::<V3PoolCreated>()
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(ChainEvent::V3PoolCreated {
        factory,
        block_number,
        tx_hash,
        event: decoded.inner.data,
    })
}

fn decode_v3_swap(log: alloy::rpc::types::eth::Log) -> Option<ChainEvent> {
    match try_decode_v3_swap(log) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "failed to decode V3 Swap log");
            None
        }
    }
}

fn try_decode_v3_swap(log: alloy::rpc::types::eth::Log) -> Result<ChainEvent, DecodeError> {
    let block_number = log.block_number.ok_or(DecodeError::MissingMetadata("block_number"))?;
    let pool_address = log.address();
    let decoded = log
        .log_decode::<V3Swap>()
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    Ok(ChainEvent::V3Swap {
        pool_address,
        block_number,
        event: decoded.inner.data,
    })
}
