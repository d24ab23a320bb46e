use std::collections::{HashMap, VecDeque};

use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::types::RejectReason;

const HOUR_SECS: u64 = 60 * 60;

/// A rolling count of signals emitted in the last hour. Owned by the
/// runtime entry point and passed by reference to the signal engine, never
/// a process-global.
pub struct SignalRateLimiter {
    emitted_at: Mutex<VecDeque<u64>>,
}

impl Default for SignalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRateLimiter {
    pub fn new() -> Self {
        Self {
            emitted_at: Mutex::new(VecDeque::new()),
        }
    }

    /// How many signals were emitted in the rolling hour ending at `now`.
    pub async fn emitted_last_hour(&self, now: u64) -> usize {
        let mut deque = self.emitted_at.lock().await;
        prune(&mut deque, now);
        deque.len()
    }

    /// Records a fresh emission at `now`.
    pub async fn record_emission(&self, now: u64) {
        let mut deque = self.emitted_at.lock().await;
        prune(&mut deque, now);
        deque.push_back(now);
    }
}

fn prune(deque: &mut VecDeque<u64>, now: u64) {
    while let Some(&front) = deque.front() {
        if now.saturating_sub(front) > HOUR_SECS {
            deque.pop_front();
        } else {
            break;
        }
    }
}

/// Set of token addresses already signaled or already rejected terminally,
/// preventing the signal engine from re-evaluating the same token forever.
/// The reason is kept alongside the address purely for diagnostic logging,
/// it has no bearing on membership semantics.
pub struct DeDupSet {
    handled: Mutex<HashMap<Address, RejectReason>>,
}

impl Default for DeDupSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DeDupSet {
    pub fn new() -> Self {
        Self {
            handled: Mutex::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, token: &Address) -> bool {
        self.handled.lock().await.contains_key(token)
    }

    pub async fn mark(&self, token: Address, reason: RejectReason) {
        self.handled.lock().await.entry(token).or_insert(reason);
    }
}
