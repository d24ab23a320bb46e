use std::collections::HashMap;

use alloy::primitives::Address;
use tokio::sync::Mutex;

const WINDOW_SECS: u64 = 24 * 60 * 60;

/// Mapping from deployer address to a bounded list of `(token_address,
/// timestamp)` tuples within a rolling 24-hour window. Entries older than
/// the window are lazily pruned on lookup, no background sweeper. Global by
/// role, but owned by the runtime entry point and passed by `&`/`Arc`,
/// never a `static`.
pub struct DeployerHistory {
    entries: Mutex<HashMap<Address, Vec<(Address, u64)>>>,
}

impl Default for DeployerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployerHistory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records that `deployer` created `token` at `now`, then prunes entries
    /// for that deployer older than the rolling window.
    pub async fn record(&self, deployer: Address, token: Address, now: u64) {
        let mut map = self.entries.lock().await;
        let list = map.entry(deployer).or_default();
        list.push((token, now));
        prune(list, now);
    }

    /// Number of tokens this deployer has launched within the last 24h, as
    /// of `now`. Pruning happens here too, so a lookup with no intervening
    /// `record` still reflects the current window.
    pub async fn count_last_24h(&self, deployer: Address, now: u64) -> usize {
        let mut map = self.entries.lock().await;
        match map.get_mut(&deployer) {
            Some(list) => {
                prune(list, now);
                list.len()
            }
            None => 0,
        }
    }
}

fn prune(list: &mut Vec<(Address, u64)>, now: u64) {
    list.retain(|(_, ts)| now.saturating_sub(*ts) <= WINDOW_SECS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[tokio::test]
    async fn counts_within_window_only() {
        let history = DeployerHistory::new();
        let deployer = address!("DDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDDD");
        let tok_a = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        let tok_b = address!("BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB");

        history.record(deployer, tok_a, 0).await;
        history.record(deployer, tok_b, 1_000).await;

        assert_eq!(history.count_last_24h(deployer, 1_000).await, 2);
        // tok_a falls outside the window once 24h + a bit elapses.
        let later = WINDOW_SECS + 1_001;
        assert_eq!(history.count_last_24h(deployer, later).await, 1);
    }

    #[tokio::test]
    async fn unknown_deployer_counts_zero() {
        let history = DeployerHistory::new();
        let deployer = address!("EEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEE");
        assert_eq!(history.count_last_24h(deployer, 12345).await, 0);
    }
}
