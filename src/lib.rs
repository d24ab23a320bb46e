pub mod chain;
pub mod config;
pub mod deployer;
pub mod enrichment;
pub mod errors;
pub mod listeners;
pub mod native_price;
pub mod output;
pub mod price;
pub mod ratelimit;
pub mod safety;
pub mod signal;
pub mod tracker;
pub mod types;

/// Wall-clock seconds since the Unix epoch. Centralized here so every
/// component stamps time the same way rather than re-deriving it.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
