use std::time::Duration;

use alloy::primitives::Address;

use crate::errors::ConfigError;

/// All recognized configuration options, loaded from the environment (with
/// `.env` support via `dotenvy`, as in the teacher's `main.rs`). One
/// immutable value, built once at startup and passed by reference to every
/// collaborator, never a process-global.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rpc_ws_url: String,
    pub rpc_http_url: String,
    pub pool_manager_address: Address,
    pub factory_address: Address,
    pub weth_address: Address,

    pub max_token_age_secs: u64,
    pub max_mcap_usd: f64,
    pub min_liquidity_usd: f64,
    pub min_buys: u64,
    pub min_largest_buy_pct: f64,
    pub max_signals_per_hour: u32,
    pub ignore_liquidity_below_usd: f64,
    pub max_deployer_tokens_24h: usize,
    pub token_ttl_secs: u64,
    pub dry_run: bool,
    pub safe_hooks: Vec<Address>,

    pub enrichment_poll_interval: Duration,
    pub enrichment_concurrency: usize,
    pub enrichment_base_url: String,
    pub chain_slug: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    pub native_usd_price_fallback: f64,
    pub native_price_poll_interval: Duration,
}

impl AppConfig {
    /// Reads every option from the process environment, filling in defaults
    /// where one exists. Only the WSS endpoint is mandatory; anything else
    /// missing or malformed is a `ConfigError`, which is fatal at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_ws_url = require_env("RPC_WS_URL")?;
        let rpc_http_url = env_or("RPC_HTTP_URL", "https://mainnet.base.org".to_string());
        let pool_manager_address = parse_address_env("POOL_MANAGER_ADDRESS")?;
        let factory_address = parse_address_env("FACTORY_ADDRESS")?;
        // Base mainnet's canonical WETH predeploy; overridable for other chains.
        let weth_address = env_or(
            "WETH_ADDRESS",
            "0x4200000000000000000000000000000000000006".to_string(),
        );
        let weth_address = weth_address.parse::<Address>().map_err(|e| ConfigError::InvalidValue {
            name: "WETH_ADDRESS",
            value: weth_address.clone(),
            reason: e.to_string(),
        })?;

        let max_token_age_secs = parse_env("MAX_TOKEN_AGE_SECS", 180)?;
        let max_mcap_usd = parse_env("MAX_MCAP_USD", 30_000.0)?;
        let min_liquidity_usd = parse_env("MIN_LIQUIDITY_USD", 3_000.0)?;
        let min_buys = parse_env("MIN_BUYS", 2)?;
        let min_largest_buy_pct = parse_env("MIN_LARGEST_BUY_PCT", 10.0)?;
        let max_signals_per_hour = parse_env("MAX_SIGNALS_PER_HOUR", 5)?;
        let ignore_liquidity_below_usd = parse_env("IGNORE_LIQUIDITY_BELOW_USD", 2_000.0)?;
        let max_deployer_tokens_24h = parse_env("MAX_DEPLOYER_TOKENS_24H", 2)?;
        let token_ttl_secs = parse_env("TOKEN_TTL_SECS", 300)?;
        let dry_run = parse_env("DRY_RUN", true)?;
        let safe_hooks = parse_safe_hooks()?;

        let enrichment_poll_interval =
            Duration::from_secs(parse_env("ENRICHMENT_POLL_INTERVAL_SECS", 8)?);
        let enrichment_concurrency = parse_env("ENRICHMENT_CONCURRENCY", 4)?;
        let enrichment_base_url = env_or(
            "ENRICHMENT_BASE_URL",
            "https://api.dexscreener.com".to_string(),
        );
        let chain_slug = env_or("CHAIN_SLUG", "base".to_string());

        let telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        let telegram_chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();

        let native_usd_price_fallback = parse_env("NATIVE_USD_PRICE_FALLBACK", 3_000.0)?;
        let native_price_poll_interval =
            Duration::from_secs(parse_env("NATIVE_PRICE_POLL_INTERVAL_SECS", 30)?);

        Ok(Self {
            rpc_ws_url,
            rpc_http_url,
            pool_manager_address,
            factory_address,
            weth_address,
            max_token_age_secs,
            max_mcap_usd,
            min_liquidity_usd,
            min_buys,
            min_largest_buy_pct,
            max_signals_per_hour,
            ignore_liquidity_below_usd,
            max_deployer_tokens_24h,
            token_ttl_secs,
            dry_run,
            safe_hooks,
            enrichment_poll_interval,
            enrichment_concurrency,
            enrichment_base_url,
            chain_slug,
            telegram_bot_token,
            telegram_chat_id,
            native_usd_price_fallback,
            native_price_poll_interval,
        })
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingRequired(name))
}

fn parse_address_env(name: &'static str) -> Result<Address, ConfigError> {
    let raw = require_env(name)?;
    raw.parse::<Address>().map_err(|e| ConfigError::InvalidValue {
        name,
        value: raw,
        reason: e.to_string(),
    })
}

fn env_or(name: &'static str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

trait FromEnvStr: Sized {
    fn parse_env_str(s: &str) -> Result<Self, String>;
}

impl FromEnvStr for u64 {
    fn parse_env_str(s: &str) -> Result<Self, String> {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

impl FromEnvStr for u32 {
    fn parse_env_str(s: &str) -> Result<Self, String> {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

impl FromEnvStr for usize {
    fn parse_env_str(s: &str) -> Result<Self, String> {
        s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

impl FromEnvStr for f64 {
    fn parse_env_str(s: &str) -> Result<Self, String> {
        s.parse().map_err(|e: std::num::ParseFloatError| e.to_string())
    }
}

impl FromEnvStr for bool {
    fn parse_env_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(format!("not a boolean: {other}")),
        }
    }
}

fn parse_env<T: FromEnvStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => T::parse_env_str(&raw).map_err(|reason| ConfigError::InvalidValue {
            name,
            value: raw,
            reason,
        }),
        Err(_) => Ok(default),
    }
}

/// `SAFE_HOOKS`: comma-separated hex addresses. Defaults to the zero address
/// only (the no-hooks pool).
fn parse_safe_hooks() -> Result<Vec<Address>, ConfigError> {
    let raw = env_or(
        "SAFE_HOOKS",
        "0x0000000000000000000000000000000000000000".to_string(),
    );
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>().map_err(|e| ConfigError::InvalidValue {
                name: "SAFE_HOOKS",
                value: s.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_required_is_config_error() {
        std::env::remove_var("RPC_WS_URL");
        let err = require_env("RPC_WS_URL").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("RPC_WS_URL")));
    }

    #[test]
    #[serial]
    fn default_safe_hooks_is_zero_address() {
        std::env::remove_var("SAFE_HOOKS");
        let hooks = parse_safe_hooks().unwrap();
        assert_eq!(hooks, vec![Address::ZERO]);
    }
}
