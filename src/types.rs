use std::collections::HashSet;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Which DEX generation a pool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DexVersion {
    #[serde(rename = "v3")]
    V3,
    #[serde(rename = "v4")]
    V4,
}

/// Pool identifier. V3 pools are addresses; V4 pools are a derived 32-byte id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairId {
    Address(Address),
    PoolId(B256),
}

impl std::fmt::Display for PairId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PairId::Address(a) => write!(f, "{a}"),
            PairId::PoolId(id) => write!(f, "{id}"),
        }
    }
}

/// Bytecode safety verdict. Transitions are one-way: `Unknown` -> `{Safe, Unsafe}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BytecodeSafety {
    Unknown,
    Safe,
    Unsafe,
}

/// Which signal-engine predicate caused a terminal rejection. Attached to
/// `DeDupSet` entries purely for diagnostic logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    TooOld,
    InsufficientLiquidity,
    McapTooHigh,
    NotEnoughBuys,
    LargestBuyTooSmall,
    BytecodeUnsafe,
    BytecodeUnknown,
    HoneypotSuspected,
    DeployerOverQuota,
    RateLimited,
    AlreadyHandled,
}

/// The central per-token aggregate. Immutable-by-default: every mutation goes
/// through a named update method, never open-field assignment, so that the
/// write-once/monotone invariants below are enforced at a single choke point
/// instead of by convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenState {
    pub token_address: Address,
    pub pair_address: PairId,
    pub dex_version: DexVersion,
    pub first_seen: u64,
    pub block_first_seen: u64,
    pub deployer: Option<Address>,
    pub liquidity_usd: f64,
    pub estimated_mcap: f64,
    pub total_buys: u64,
    pub total_sells: u64,
    unique_buyers: HashSet<Address>,
    pub largest_buy_usd: f64,
    pub bytecode_safe: BytecodeSafety,
    pub enriched_at: Option<u64>,
    pub honeypot_suspected: bool,
    pub signaled: bool,
}

impl TokenState {
    pub fn new(
        token_address: Address,
        pair_address: PairId,
        dex_version: DexVersion,
        first_seen: u64,
        block_first_seen: u64,
    ) -> Self {
        Self {
            token_address,
            pair_address,
            dex_version,
            first_seen,
            block_first_seen,
            deployer: None,
            liquidity_usd: 0.0,
            estimated_mcap: 0.0,
            total_buys: 0,
            total_sells: 0,
            unique_buyers: HashSet::new(),
            largest_buy_usd: 0.0,
            bytecode_safe: BytecodeSafety::Unknown,
            enriched_at: None,
            honeypot_suspected: false,
            signaled: false,
        }
    }

    pub fn unique_buyer_count(&self) -> usize {
        self.unique_buyers.len()
    }

    /// Records a buy: bumps the monotone counter, widens the buyer set, and
    /// raises `largest_buy_usd` if this trade is bigger. `total_buys >=
    /// unique_buyers.len()` holds by construction since every call increments
    /// `total_buys` exactly once regardless of whether `buyer` is new.
    pub fn record_buy(&mut self, buyer: Address, usd_value: f64) {
        self.total_buys += 1;
        self.unique_buyers.insert(buyer);
        if usd_value > self.largest_buy_usd {
            self.largest_buy_usd = usd_value;
        }
    }

    pub fn record_sell(&mut self) {
        self.total_sells += 1;
    }

    /// Overwrites liquidity/mcap estimates only with a positive reading.
    /// On-chain estimate and enrichment feed both call this, so "most recent
    /// of either source" falls out of always overwriting on success rather
    /// than tracking which source is "better."
    pub fn update_liquidity_usd(&mut self, liquidity_usd: f64) {
        if liquidity_usd > 0.0 {
            self.liquidity_usd = liquidity_usd;
        }
    }

    pub fn update_estimated_mcap(&mut self, mcap_usd: f64) {
        if mcap_usd > 0.0 {
            self.estimated_mcap = mcap_usd;
        }
    }

    pub fn set_deployer(&mut self, deployer: Address) {
        if self.deployer.is_none() {
            self.deployer = Some(deployer);
        }
    }

    /// One-way transition: once the verdict leaves `Unknown` it never changes.
    pub fn set_bytecode_safety(&mut self, verdict: BytecodeSafety) {
        if self.bytecode_safe == BytecodeSafety::Unknown {
            self.bytecode_safe = verdict;
        }
    }

    pub fn mark_enriched(&mut self, at: u64) {
        self.enriched_at = Some(at);
    }

    pub fn mark_honeypot_suspected(&mut self) {
        self.honeypot_suspected = true;
    }

    /// Write-once latch. Returns `false` (no-op) if already signaled, so
    /// callers cannot accidentally flip it back or double-count an emission.
    pub fn mark_signaled(&mut self) -> bool {
        if self.signaled {
            return false;
        }
        self.signaled = true;
        true
    }
}

/// Diagnostic payload enqueued to the output sender once every signal-engine
/// predicate has passed. Fields are exactly the values that gated emission,
/// so a human reading the signal log need not re-derive them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub token_address: Address,
    pub pair_address: PairId,
    pub dex_version: DexVersion,
    pub emitted_at: u64,
    pub liquidity_usd: f64,
    pub estimated_mcap: f64,
    pub total_buys: u64,
    pub largest_buy_usd: f64,
    pub deployer: Option<Address>,
}

impl SignalRecord {
    pub fn from_state(state: &TokenState, emitted_at: u64) -> Self {
        Self {
            token_address: state.token_address,
            pair_address: state.pair_address,
            dex_version: state.dex_version,
            emitted_at,
            liquidity_usd: state.liquidity_usd,
            estimated_mcap: state.estimated_mcap,
            total_buys: state.total_buys,
            largest_buy_usd: state.largest_buy_usd,
            deployer: state.deployer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use proptest::prelude::*;

    fn new_state() -> TokenState {
        TokenState::new(
            address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"),
            PairId::Address(address!("BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB")),
            DexVersion::V4,
            1_000,
            100,
        )
    }

    #[test]
    fn total_buys_never_below_unique_buyers() {
        let mut state = new_state();
        let buyer = address!("CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC");
        state.record_buy(buyer, 10.0);
        state.record_buy(buyer, 20.0);
        assert!(state.total_buys >= state.unique_buyer_count() as u64);
        assert_eq!(state.total_buys, 2);
        assert_eq!(state.unique_buyer_count(), 1);
        assert_eq!(state.largest_buy_usd, 20.0);
    }

    #[test]
    fn signaled_is_write_once() {
        let mut state = new_state();
        assert!(state.mark_signaled());
        assert!(!state.mark_signaled());
        assert!(state.signaled);
    }

    #[test]
    fn bytecode_safety_transitions_only_once() {
        let mut state = new_state();
        state.set_bytecode_safety(BytecodeSafety::Safe);
        state.set_bytecode_safety(BytecodeSafety::Unsafe);
        assert_eq!(state.bytecode_safe, BytecodeSafety::Safe);
    }

    #[test]
    fn liquidity_update_ignores_non_positive_values() {
        let mut state = new_state();
        state.update_liquidity_usd(500.0);
        state.update_liquidity_usd(-10.0);
        state.update_liquidity_usd(0.0);
        assert_eq!(state.liquidity_usd, 500.0);
    }

    /// For any sequence of buy events, `total_buys >= |unique_buyers|` holds
    /// at every observable moment.
    proptest! {
        #[test]
        fn total_buys_never_below_unique_buyers_for_any_sequence(
            buyer_indices in prop::collection::vec(0u8..5u8, 0..50),
            usd_values in prop::collection::vec(0.0f64..10_000.0, 0..50),
        ) {
            let mut state = new_state();
            let buyers: Vec<Address> = (0u8..5).map(|i| Address::from([i; 20])).collect();

            for (idx, usd) in buyer_indices.iter().zip(usd_values.iter()) {
                state.record_buy(buyers[*idx as usize], *usd);
                prop_assert!(state.total_buys >= state.unique_buyer_count() as u64);
            }
        }
    }

    /// `signaled` never transitions from true back to false, regardless of
    /// how many times `mark_signaled` is called.
    proptest! {
        #[test]
        fn signaled_never_reverts_across_repeated_calls(call_count in 0usize..20) {
            let mut state = new_state();
            let mut first_true_seen = false;
            for _ in 0..call_count {
                state.mark_signaled();
                if state.signaled {
                    first_true_seen = true;
                }
                if first_true_seen {
                    prop_assert!(state.signaled);
                }
            }
        }
    }
}
