use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::TokenState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Keyed store of per-token aggregates with TTL eviction. A single
/// whole-map `Mutex` behind an `Arc` is the sole serialization point: every
/// component touches a token only through `upsert`/`mutate`/`iter_active`,
/// never by holding a reference across an await point, so lock hold times
/// stay short and this never becomes a contention bottleneck. Generalizes
/// the teacher's own `Arc<Mutex<ScannerState>>` from one shared blob to
/// these four explicit primitives.
#[derive(Clone)]
pub struct TokenTracker {
    inner: Arc<Mutex<HashMap<Address, TokenState>>>,
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Idempotent insert: an existing entry always wins over re-creation, so
    /// a duplicated pool-creation event (e.g. a redelivered log) never resets
    /// counters that have already accumulated.
    pub async fn upsert(&self, token: Address, init: impl FnOnce() -> TokenState) {
        let mut map = self.inner.lock().await;
        map.entry(token).or_insert_with(init);
    }

    /// Atomic read-modify-write on one entry. Returns `None` if the token is
    /// not tracked (evicted, or never seen). The closure's return value is
    /// passed through so callers (the Signal Engine) can report what
    /// happened without a second lookup.
    pub async fn mutate<R>(&self, token: Address, f: impl FnOnce(&mut TokenState) -> R) -> Option<R> {
        let mut map = self.inner.lock().await;
        map.get_mut(&token).map(f)
    }

    /// Point-in-time snapshot of tokens not yet signaled, for the
    /// enrichment loop to iterate without holding the tracker lock across
    /// network I/O.
    pub async fn iter_active(&self) -> Vec<TokenState> {
        let map = self.inner.lock().await;
        map.values().filter(|t| !t.signaled).cloned().collect()
    }

    /// Removes entries older than `ttl_secs` as of `now`. Entries currently
    /// being signaled never observe this: `mutate` holds the lock for the
    /// whole evaluation, so a concurrent `sweep` call simply blocks until the
    /// mutation (and any resulting state change) has completed, then reads
    /// the fresh `first_seen`/`signaled` state.
    pub async fn sweep(&self, now: u64, ttl_secs: u64) -> usize {
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, state| now.saturating_sub(state.first_seen) <= ttl_secs);
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn contains(&self, token: &Address) -> bool {
        self.inner.lock().await.contains_key(token)
    }

    /// Drops a token before its TTL expires. Used for the "ignore liquidity
    /// below" admission floor: once a token's liquidity is observed to sit
    /// under that floor, there is no point paying further enrichment polls
    /// for it.
    pub async fn remove(&self, token: &Address) {
        self.inner.lock().await.remove(token);
    }
}

/// Runs `sweep` on a 30s cadence until `shutdown` fires.
pub async fn run_sweeper(tracker: TokenTracker, ttl_secs: u64, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => return,
        }
        let evicted = tracker.sweep(crate::now_secs(), ttl_secs).await;
        if evicted > 0 {
            debug!(evicted, "swept expired tokens");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DexVersion, PairId};
    use alloy::primitives::address;

    fn token() -> Address {
        address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let tracker = TokenTracker::new();
        let addr = token();
        tracker
            .upsert(addr, || {
                TokenState::new(addr, PairId::Address(addr), DexVersion::V3, 100, 1)
            })
            .await;
        tracker.mutate(addr, |s| s.record_buy(addr, 50.0)).await;
        tracker
            .upsert(addr, || {
                TokenState::new(addr, PairId::Address(addr), DexVersion::V3, 999, 2)
            })
            .await;

        let state = tracker.mutate(addr, |s| s.clone()).await.unwrap();
        assert_eq!(state.first_seen, 100);
        assert_eq!(state.total_buys, 1);
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired_entries() {
        let tracker = TokenTracker::new();
        let fresh = address!("1111111111111111111111111111111111111111");
        let stale = address!("2222222222222222222222222222222222222222");
        tracker
            .upsert(fresh, || {
                TokenState::new(fresh, PairId::Address(fresh), DexVersion::V3, 1_000, 1)
            })
            .await;
        tracker
            .upsert(stale, || {
                TokenState::new(stale, PairId::Address(stale), DexVersion::V3, 0, 1)
            })
            .await;

        let evicted = tracker.sweep(1_000, 300).await;
        assert_eq!(evicted, 1);
        assert!(tracker.contains(&fresh).await);
        assert!(!tracker.contains(&stale).await);
    }

    #[tokio::test]
    async fn iter_active_excludes_signaled_tokens() {
        let tracker = TokenTracker::new();
        let addr = token();
        tracker
            .upsert(addr, || {
                TokenState::new(addr, PairId::Address(addr), DexVersion::V3, 100, 1)
            })
            .await;
        assert_eq!(tracker.iter_active().await.len(), 1);
        tracker.mutate(addr, |s| s.mark_signaled()).await;
        assert_eq!(tracker.iter_active().await.len(), 0);
    }
}
