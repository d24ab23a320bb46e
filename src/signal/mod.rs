//! Rule evaluation and anti-spam gating. Invoked after every mutation of a
//! `TokenState` that is not yet signaled and not terminally rejected; never
//! invoked directly by the tracker itself, so a component that forgets to
//! call `evaluate` simply leaves a token pending rather than corrupting
//! state.

use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::AppConfig;
use crate::deployer::DeployerHistory;
use crate::output::enqueue_or_drop;
use crate::ratelimit::{DeDupSet, SignalRateLimiter};
use crate::tracker::TokenTracker;
use crate::types::{BytecodeSafety, RejectReason, SignalRecord, TokenState};

/// The four anti-spam collaborators plus config, bundled so listeners and
/// the enrichment loop share one evaluation entry point instead of each
/// re-threading four arguments.
pub struct SignalEngine {
    config: Arc<AppConfig>,
    deployer_history: Arc<DeployerHistory>,
    rate_limiter: Arc<SignalRateLimiter>,
    dedup: Arc<DeDupSet>,
}

enum Judgement {
    Pass,
    /// Fails a non-terminal predicate; may still pass on a later mutation.
    Wait(RejectReason),
    /// Fails a terminal predicate; the token is added to the DeDupSet and
    /// never re-evaluated.
    Terminal(RejectReason),
}

impl SignalEngine {
    pub fn new(
        config: Arc<AppConfig>,
        deployer_history: Arc<DeployerHistory>,
        rate_limiter: Arc<SignalRateLimiter>,
        dedup: Arc<DeDupSet>,
    ) -> Self {
        Self {
            config,
            deployer_history,
            rate_limiter,
            dedup,
        }
    }

    /// Re-evaluates `token` against the current tracker state and, on a full
    /// pass, atomically marks it signaled and returns the diagnostic record
    /// to enqueue. Returns `None` for every other outcome (already handled,
    /// evicted, waiting, or terminally rejected).
    pub async fn evaluate(&self, tracker: &TokenTracker, token: Address, now: u64) -> Option<SignalRecord> {
        if self.dedup.contains(&token).await {
            return None;
        }

        let snapshot = tracker.mutate(token, |s| s.clone()).await?;

        let deployer_count = match snapshot.deployer {
            Some(deployer) => self.deployer_history.count_last_24h(deployer, now).await,
            // Resolution hasn't completed yet; predicate 8 cannot fail on an
            // unknown deployer, so it is treated as zero rather than stalled.
            None => 0,
        };
        let emitted_last_hour = self.rate_limiter.emitted_last_hour(now).await;

        match self.judge(&snapshot, now, deployer_count, emitted_last_hour) {
            Judgement::Pass => {
                let record = tracker
                    .mutate(token, |s| {
                        if s.mark_signaled() {
                            Some(SignalRecord::from_state(s, now))
                        } else {
                            None
                        }
                    })
                    .await
                    .flatten();
                if record.is_some() {
                    self.dedup.mark(token, RejectReason::AlreadyHandled).await;
                    self.rate_limiter.record_emission(now).await;
                }
                record
            }
            Judgement::Terminal(reason) => {
                debug!(%token, ?reason, "terminal reject");
                self.dedup.mark(token, reason).await;
                None
            }
            Judgement::Wait(reason) => {
                debug!(%token, ?reason, "not yet eligible");
                None
            }
        }
    }

    /// Convenience wrapper used by every call site that mutates a
    /// `TokenState` (the two listeners, the enrichment fetcher, the safety
    /// scan and deployer-resolution callbacks): evaluate, and on a pass,
    /// enqueue onto the bounded outbound queue.
    pub async fn evaluate_and_emit(
        &self,
        tracker: &TokenTracker,
        out_tx: &mpsc::Sender<SignalRecord>,
        token: Address,
        now: u64,
    ) {
        if let Some(record) = self.evaluate(tracker, token, now).await {
            enqueue_or_drop(out_tx, record);
        }
    }

    /// Short-circuit conjunction, cheapest and most-often-failing predicates
    /// first.
    fn judge(&self, state: &TokenState, now: u64, deployer_count: usize, emitted_last_hour: usize) -> Judgement {
        let age = now.saturating_sub(state.first_seen);
        if age > self.config.max_token_age_secs {
            return Judgement::Terminal(RejectReason::TooOld);
        }
        if state.liquidity_usd < self.config.min_liquidity_usd {
            return Judgement::Wait(RejectReason::InsufficientLiquidity);
        }
        if state.estimated_mcap > self.config.max_mcap_usd {
            return Judgement::Wait(RejectReason::McapTooHigh);
        }
        if state.total_buys < self.config.min_buys {
            return Judgement::Wait(RejectReason::NotEnoughBuys);
        }
        let required_largest_buy = self.config.min_largest_buy_pct / 100.0 * state.liquidity_usd;
        if state.largest_buy_usd < required_largest_buy {
            return Judgement::Wait(RejectReason::LargestBuyTooSmall);
        }
        match state.bytecode_safe {
            BytecodeSafety::Unsafe => return Judgement::Terminal(RejectReason::BytecodeUnsafe),
            BytecodeSafety::Unknown => return Judgement::Wait(RejectReason::BytecodeUnknown),
            BytecodeSafety::Safe => {}
        }
        if state.honeypot_suspected {
            return Judgement::Terminal(RejectReason::HoneypotSuspected);
        }
        if deployer_count > self.config.max_deployer_tokens_24h {
            return Judgement::Terminal(RejectReason::DeployerOverQuota);
        }
        if emitted_last_hour >= self.config.max_signals_per_hour as usize {
            return Judgement::Wait(RejectReason::RateLimited);
        }
        Judgement::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DexVersion, PairId};
    use alloy::primitives::address;

    fn engine() -> SignalEngine {
        let config = Arc::new(test_config());
        SignalEngine::new(
            config,
            Arc::new(DeployerHistory::new()),
            Arc::new(SignalRateLimiter::new()),
            Arc::new(DeDupSet::new()),
        )
    }

    fn test_config() -> AppConfig {
        AppConfig {
            rpc_ws_url: "wss://example".to_string(),
            rpc_http_url: "https://example".to_string(),
            pool_manager_address: Address::ZERO,
            factory_address: Address::ZERO,
            weth_address: Address::ZERO,
            max_token_age_secs: 180,
            max_mcap_usd: 30_000.0,
            min_liquidity_usd: 3_000.0,
            min_buys: 2,
            min_largest_buy_pct: 10.0,
            max_signals_per_hour: 5,
            ignore_liquidity_below_usd: 2_000.0,
            max_deployer_tokens_24h: 2,
            token_ttl_secs: 300,
            dry_run: true,
            safe_hooks: vec![Address::ZERO],
            enrichment_poll_interval: std::time::Duration::from_secs(8),
            enrichment_concurrency: 4,
            enrichment_base_url: "https://api.dexscreener.com".to_string(),
            chain_slug: "base".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            native_usd_price_fallback: 3_000.0,
            native_price_poll_interval: std::time::Duration::from_secs(30),
        }
    }

    fn qualifying_state() -> TokenState {
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let mut state = TokenState::new(token, PairId::Address(token), DexVersion::V4, 0, 1);
        state.update_liquidity_usd(5_000.0);
        state.update_estimated_mcap(12_000.0);
        state.record_buy(address!("1111111111111111111111111111111111111111"), 600.0);
        state.record_buy(address!("2222222222222222222222222222222222222222"), 100.0);
        state.record_buy(address!("3333333333333333333333333333333333333333"), 50.0);
        state.set_bytecode_safety(BytecodeSafety::Safe);
        state
    }

    #[tokio::test]
    async fn happy_path_emits_exactly_one_signal() {
        let tracker = TokenTracker::new();
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let state = qualifying_state();
        tracker.upsert(token, || state.clone()).await;

        let engine = engine();
        let first = engine.evaluate(&tracker, token, 10).await;
        assert!(first.is_some());
        assert_eq!(first.unwrap().token_address, token);

        let second = engine.evaluate(&tracker, token, 11).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn unsafe_bytecode_is_terminal() {
        let tracker = TokenTracker::new();
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let mut state = qualifying_state();
        state.bytecode_safe = BytecodeSafety::Unknown;
        state.set_bytecode_safety(BytecodeSafety::Unsafe);
        tracker.upsert(token, || state).await;

        let engine = engine();
        assert!(engine.evaluate(&tracker, token, 10).await.is_none());
        assert!(engine.dedup.contains(&token).await);
    }

    #[tokio::test]
    async fn age_expiry_rejects_terminally() {
        let tracker = TokenTracker::new();
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        tracker.upsert(token, qualifying_state).await;

        let engine = engine();
        assert!(engine.evaluate(&tracker, token, 181).await.is_none());
        assert!(engine.dedup.contains(&token).await);
    }

    #[tokio::test]
    async fn low_liquidity_waits_without_dedup() {
        let tracker = TokenTracker::new();
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let mut state = qualifying_state();
        state.liquidity_usd = 100.0;
        tracker.upsert(token, || state).await;

        let engine = engine();
        assert!(engine.evaluate(&tracker, token, 10).await.is_none());
        assert!(!engine.dedup.contains(&token).await);
    }

    /// A deployer who already launched 2 tokens in the last 24h gets a
    /// third rejected terminally, even though every other predicate passes.
    #[tokio::test]
    async fn serial_deployer_over_quota_is_terminal() {
        let tracker = TokenTracker::new();
        let deployer = address!("DDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDD");
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let mut state = qualifying_state();
        state.set_deployer(deployer);
        tracker.upsert(token, || state).await;

        // Two prior tokens from this deployer, plus this one once its own
        // deployer resolution completes (mirroring `schedule_enrichment_tasks`
        // recording the resolved deployer before re-evaluating).
        let deployer_history = Arc::new(DeployerHistory::new());
        deployer_history
            .record(deployer, address!("1111111111111111111111111111111111111111"), 0)
            .await;
        deployer_history
            .record(deployer, address!("2222222222222222222222222222222222222222"), 0)
            .await;
        deployer_history.record(deployer, token, 0).await;

        let engine = SignalEngine::new(
            Arc::new(test_config()),
            Arc::clone(&deployer_history),
            Arc::new(SignalRateLimiter::new()),
            Arc::new(DeDupSet::new()),
        );

        assert!(engine.evaluate(&tracker, token, 10).await.is_none());
        assert!(engine.dedup.contains(&token).await);
    }

    /// 5 distinct tokens already signaled in the last hour blocks a 6th
    /// qualifying token until the window rolls.
    #[tokio::test]
    async fn rate_limit_blocks_sixth_signal_within_the_hour() {
        let tracker = TokenTracker::new();
        let rate_limiter = Arc::new(SignalRateLimiter::new());
        for _ in 0..5 {
            rate_limiter.record_emission(0).await;
        }

        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        tracker.upsert(token, qualifying_state).await;

        let engine = SignalEngine::new(
            Arc::new(test_config()),
            Arc::new(DeployerHistory::new()),
            Arc::clone(&rate_limiter),
            Arc::new(DeDupSet::new()),
        );

        // Within the hour: still at the cap, so the otherwise-qualifying
        // token waits rather than getting dropped permanently.
        assert!(engine.evaluate(&tracker, token, 1_000).await.is_none());
        assert!(!engine.dedup.contains(&token).await);

        // Once the oldest emission falls outside the rolling window, the
        // same token passes on re-evaluation.
        let after_window = 3_600 + 1;
        assert!(engine.evaluate(&tracker, token, after_window).await.is_some());
    }

    /// Honeypot suspicion (set by the enrichment fetcher from
    /// `buys>5 && sells==0`) is a terminal reject even when every other
    /// predicate passes.
    #[tokio::test]
    async fn honeypot_suspected_is_terminal() {
        let tracker = TokenTracker::new();
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let mut state = qualifying_state();
        state.mark_honeypot_suspected();
        tracker.upsert(token, || state).await;

        let engine = engine();
        assert!(engine.evaluate(&tracker, token, 10).await.is_none());
        assert!(engine.dedup.contains(&token).await);
    }
}
