//! V3 and V4 listeners: receivers over the channel the chain client's
//! subscription loop fans events into. Both listeners share one dispatcher
//! here because they converge on the same collaborators (tracker, signal
//! engine, deployer history) and the same admission rule, exactly one side
//! of the pool must be WETH, so splitting them into separate types would
//! just duplicate that rule.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chain::events::compute_v4_pool_id;
use crate::chain::{resolve, ChainEvent, HttpProvider};
use crate::config::AppConfig;
use crate::deployer::DeployerHistory;
use crate::native_price::NativePriceFeed;
use crate::price;
use crate::safety;
use crate::signal::SignalEngine;
use crate::tracker::TokenTracker;
use crate::types::{DexVersion, PairId, SignalRecord, TokenState};

/// Fetching real on-chain decimals would need an extra `eth_call` per pool,
/// which the tolerance for approximate mcap/liquidity here doesn't warrant.
/// Correct for WETH and for the overwhelming majority of ERC-20 tokens
/// launched on Base.
const ASSUMED_DECIMALS: u8 = 18;

/// Mechanical pool facts needed to interpret future Swap events for a pool,
/// kept outside `TokenState` since these aren't per-token data, they're
/// bookkeeping the listener needs to decode amounts correctly.
#[derive(Debug, Clone, Copy)]
struct PoolFacts {
    token_address: Address,
    token_is_currency0: bool,
}

#[derive(Default)]
struct PoolRegistry {
    by_pair: HashMap<PairId, PoolFacts>,
}

impl PoolRegistry {
    fn insert(&mut self, pair: PairId, facts: PoolFacts) {
        self.by_pair.entry(pair).or_insert(facts);
    }

    fn get(&self, pair: &PairId) -> Option<PoolFacts> {
        self.by_pair.get(pair).copied()
    }
}

pub struct EventDispatcher {
    tracker: TokenTracker,
    registry: Mutex<PoolRegistry>,
    config: Arc<AppConfig>,
    native_price: Arc<NativePriceFeed>,
    deployer_history: Arc<DeployerHistory>,
    signal_engine: Arc<SignalEngine>,
    http: Arc<HttpProvider>,
    out_tx: mpsc::Sender<SignalRecord>,
}

impl EventDispatcher {
    pub fn new(
        tracker: TokenTracker,
        config: Arc<AppConfig>,
        native_price: Arc<NativePriceFeed>,
        deployer_history: Arc<DeployerHistory>,
        signal_engine: Arc<SignalEngine>,
        http: Arc<HttpProvider>,
        out_tx: mpsc::Sender<SignalRecord>,
    ) -> Self {
        Self {
            tracker,
            registry: Mutex::new(PoolRegistry::default()),
            config,
            native_price,
            deployer_history,
            signal_engine,
            http,
            out_tx,
        }
    }

    /// Consumes chain events in arrival order. Each event is handled to
    /// completion before the next is read off the channel, so the total
    /// order across events is the arrival order; per-token order is
    /// additionally enforced by the tracker's `mutate`.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ChainEvent>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.dispatch(event).await,
                        None => return,
                    }
                }
                _ = shutdown.cancelled() => return,
            }
        }
    }

    async fn dispatch(&self, event: ChainEvent) {
        match event {
            ChainEvent::V4Initialize { block_number, tx_hash, event, .. } => {
                self.handle_v4_initialize(block_number, tx_hash, event).await;
            }
            ChainEvent::V4Swap { event, .. } => {
                self.handle_v4_swap(event).await;
            }
            ChainEvent::V3PoolCreated { block_number, tx_hash, event, .. } => {
                self.handle_v3_pool_created(block_number, tx_hash, event).await;
            }
            ChainEvent::V3Swap { pool_address, event, .. } => {
                self.handle_v3_swap(pool_address, event).await;
            }
        }
    }

    async fn handle_v4_initialize(
        &self,
        block_number: u64,
        tx_hash: alloy::primitives::B256,
        event: crate::chain::events::V4Initialize,
    ) {
        if !self.config.safe_hooks.contains(&event.hooks) {
            debug!(hooks = %event.hooks, "V4 Initialize: hooks not in allow-list, dropping");
            return;
        }
        let Some((token, token_is_currency0)) =
            identify_token_side(event.currency0, event.currency1, self.config.weth_address)
        else {
            debug!("V4 Initialize: neither side is WETH, dropping");
            return;
        };

        let recomputed_id = compute_v4_pool_id(
            event.currency0,
            event.currency1,
            event.fee.to::<u32>(),
            event.tickSpacing.as_i32(),
            event.hooks,
        );
        let pair = PairId::PoolId(recomputed_id);

        let native_usd_price = self.native_price.get().await;
        let sqrt_price = price::abs_decimal(event.sqrtPriceX96);
        let estimated_mcap = price::estimate_mcap_usd(
            sqrt_price,
            token_is_currency0,
            ASSUMED_DECIMALS,
            ASSUMED_DECIMALS,
            native_usd_price,
        );

        if estimated_mcap < 0.0 {
            return; // malformed price reading; wait for a swap to refresh it instead of admitting garbage
        }

        self.registry.lock().await.insert(
            pair,
            PoolFacts {
                token_address: token,
                token_is_currency0,
            },
        );

        let now = crate::now_secs();
        self.tracker
            .upsert(token, || {
                let mut state = TokenState::new(token, pair, DexVersion::V4, now, block_number);
                state.update_estimated_mcap(estimated_mcap);
                state
            })
            .await;

        self.schedule_enrichment_tasks(token, block_number, tx_hash);
        self.signal_engine.evaluate_and_emit(&self.tracker, &self.out_tx, token, now).await;
    }

    async fn handle_v4_swap(&self, event: crate::chain::events::V4Swap) {
        let pair = PairId::PoolId(event.id);
        let Some(facts) = self.registry.lock().await.get(&pair) else {
            return; // pool not tracked (never admitted, or already evicted)
        };

        let token_amount_negative = if facts.token_is_currency0 {
            event.amount0.is_negative()
        } else {
            event.amount1.is_negative()
        };

        let amount0_abs = price::abs_decimal(event.amount0.unsigned_abs());
        let amount1_abs = price::abs_decimal(event.amount1.unsigned_abs());
        let sqrt_price = price::abs_decimal(event.sqrtPriceX96);
        self.apply_swap(
            facts.token_address,
            token_amount_negative,
            event.sender,
            amount0_abs,
            amount1_abs,
            event.liquidity,
            sqrt_price,
        )
        .await;
    }

    async fn handle_v3_pool_created(
        &self,
        block_number: u64,
        tx_hash: alloy::primitives::B256,
        event: crate::chain::events::V3PoolCreated,
    ) {
        let Some((token, token_is_currency0)) =
            identify_token_side(event.token0, event.token1, self.config.weth_address)
        else {
            debug!("V3 PoolCreated: neither side is WETH, dropping");
            return;
        };

        let pair = PairId::Address(event.pool);
        self.registry.lock().await.insert(
            pair,
            PoolFacts {
                token_address: token,
                token_is_currency0,
            },
        );

        let now = crate::now_secs();
        self.tracker
            .upsert(token, || TokenState::new(token, pair, DexVersion::V3, now, block_number))
            .await;

        self.schedule_enrichment_tasks(token, block_number, tx_hash);
        self.signal_engine.evaluate_and_emit(&self.tracker, &self.out_tx, token, now).await;
    }

    async fn handle_v3_swap(&self, pool_address: Address, event: crate::chain::events::V3Swap) {
        let pair = PairId::Address(pool_address);
        let Some(facts) = self.registry.lock().await.get(&pair) else {
            return; // global subscription; only act if this pool is ours
        };

        let token_amount_negative = if facts.token_is_currency0 {
            event.amount0.is_negative()
        } else {
            event.amount1.is_negative()
        };

        let amount0_abs = price::abs_decimal(event.amount0.unsigned_abs());
        let amount1_abs = price::abs_decimal(event.amount1.unsigned_abs());
        let sqrt_price = price::abs_decimal(event.sqrtPriceX96);
        // V3 attributes the buyer as `recipient`, not `sender`; V4's
        // `PoolManager` always calls swap on behalf of its own router, so
        // `sender` there is the one address that actually identifies the
        // trader.
        self.apply_swap(
            facts.token_address,
            token_amount_negative,
            event.recipient,
            amount0_abs,
            amount1_abs,
            event.liquidity,
            sqrt_price,
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_swap(
        &self,
        token: Address,
        token_amount_negative: bool,
        buyer: Address,
        amount0_abs: U256,
        amount1_abs: U256,
        pool_liquidity: u128,
        sqrt_price_x96: U256,
    ) {
        let native_usd_price = self.native_price.get().await;
        let usd_value = price::native_notional_usd(amount0_abs, amount1_abs, native_usd_price);
        let liquidity_usd = price::estimate_liquidity_usd(pool_liquidity, sqrt_price_x96, native_usd_price);

        self.tracker
            .mutate(token, |state| {
                if token_amount_negative {
                    state.record_buy(buyer, usd_value);
                } else {
                    state.record_sell();
                }
                state.update_liquidity_usd(liquidity_usd);
            })
            .await;

        // Once liquidity is observed below this floor, stop tracking the
        // token rather than keep paying enrichment polls for something
        // that will never clear the liquidity predicate.
        if liquidity_usd > 0.0 && liquidity_usd < self.config.ignore_liquidity_below_usd {
            debug!(%token, liquidity_usd, "liquidity below ignore floor, dropping token");
            self.tracker.remove(&token).await;
            return;
        }

        let now = crate::now_secs();
        self.signal_engine.evaluate_and_emit(&self.tracker, &self.out_tx, token, now).await;
    }

    /// Spawns the bytecode safety scan and deployer resolution as separate
    /// tasks. Both suspend on network I/O and must not block the dispatch
    /// loop.
    fn schedule_enrichment_tasks(&self, token: Address, block_number: u64, _tx_hash: alloy::primitives::B256) {
        let http = Arc::clone(&self.http);
        let tracker = self.tracker.clone();
        let signal_engine = Arc::clone(&self.signal_engine);
        let out_tx = self.out_tx.clone();
        tokio::spawn(async move {
            match safety::scan(&http, token).await {
                Ok(verdict) => {
                    tracker.mutate(token, |s| s.set_bytecode_safety(verdict)).await;
                    let now = crate::now_secs();
                    signal_engine.evaluate_and_emit(&tracker, &out_tx, token, now).await;
                }
                Err(e) => warn!(%token, error = %e, "bytecode safety scan failed"),
            }
        });

        let http = Arc::clone(&self.http);
        let tracker = self.tracker.clone();
        let deployer_history = Arc::clone(&self.deployer_history);
        let signal_engine = Arc::clone(&self.signal_engine);
        let out_tx = self.out_tx.clone();
        tokio::spawn(async move {
            match resolve::resolve_deployer(&http, token, block_number).await {
                Ok(Some(deployer)) => {
                    let now = crate::now_secs();
                    tracker.mutate(token, |s| s.set_deployer(deployer)).await;
                    deployer_history.record(deployer, token, now).await;
                    signal_engine.evaluate_and_emit(&tracker, &out_tx, token, now).await;
                }
                Ok(None) => debug!(%token, "deployer could not be resolved"),
                Err(e) => warn!(%token, error = %e, "deployer resolution failed"),
            }
        });
    }
}

/// Admission rule: exactly one side must be WETH; the other side is the
/// candidate token. Returns `(token, token_is_currency0)`.
fn identify_token_side(currency0: Address, currency1: Address, weth: Address) -> Option<(Address, bool)> {
    match (currency0 == weth, currency1 == weth) {
        (true, false) => Some((currency1, false)),
        (false, true) => Some((currency0, true)),
        _ => None, // neither or both are WETH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn identify_token_side_rejects_neither_weth() {
        let weth = address!("4200000000000000000000000000000000000006");
        let a = address!("1111111111111111111111111111111111111111");
        let b = address!("2222222222222222222222222222222222222222");
        assert!(identify_token_side(a, b, weth).is_none());
    }

    #[test]
    fn identify_token_side_rejects_both_weth() {
        let weth = address!("4200000000000000000000000000000000000006");
        assert!(identify_token_side(weth, weth, weth).is_none());
    }

    #[test]
    fn identify_token_side_picks_non_weth_side() {
        let weth = address!("4200000000000000000000000000000000000006");
        let token = address!("1111111111111111111111111111111111111111");
        assert_eq!(identify_token_side(weth, token, weth), Some((token, false)));
        assert_eq!(identify_token_side(token, weth, weth), Some((token, true)));
    }
}
