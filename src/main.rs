use std::sync::Arc;

use base_new_pool_signal::chain::ChainClient;
use base_new_pool_signal::config::AppConfig;
use base_new_pool_signal::deployer::DeployerHistory;
use base_new_pool_signal::enrichment::EnrichmentFetcher;
use base_new_pool_signal::listeners::EventDispatcher;
use base_new_pool_signal::native_price::{run_poller as run_native_price_poller, NativePriceFeed};
use base_new_pool_signal::output::{self, DryRunSender, OutputSender, TelegramSender};
use base_new_pool_signal::ratelimit::{DeDupSet, SignalRateLimiter};
use base_new_pool_signal::signal::SignalEngine;
use base_new_pool_signal::tracker::{run_sweeper, TokenTracker};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CHAIN_EVENT_QUEUE_DEPTH: usize = 1024;
/// Bounded so a stalled output sender can't back up the whole pipeline;
/// a full queue drops the newest signal with a warning instead of blocking.
const SIGNAL_QUEUE_DEPTH: usize = 32;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!(error = %e, "configuration error, exiting");
            std::process::exit(1);
        }
    };

    info!(dry_run = config.dry_run, "starting new-pool signal detector");

    let tracker = TokenTracker::new();
    let deployer_history = Arc::new(DeployerHistory::new());
    let rate_limiter = Arc::new(SignalRateLimiter::new());
    let dedup = Arc::new(DeDupSet::new());
    let native_price = Arc::new(NativePriceFeed::new(config.native_usd_price_fallback));
    let signal_engine = Arc::new(SignalEngine::new(
        Arc::clone(&config),
        Arc::clone(&deployer_history),
        Arc::clone(&rate_limiter),
        Arc::clone(&dedup),
    ));

    let chain_client = Arc::new(ChainClient::new(
        &config.rpc_ws_url,
        &config.rpc_http_url,
        config.pool_manager_address,
        config.factory_address,
    )?);
    let http = chain_client.http();

    let output_sender: Arc<dyn OutputSender> = if config.dry_run {
        Arc::new(DryRunSender)
    } else {
        let (Some(token), Some(chat_id)) = (config.telegram_bot_token.clone(), config.telegram_chat_id.clone())
        else {
            error!("DRY_RUN=false requires TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID, exiting");
            std::process::exit(1);
        };
        Arc::new(TelegramSender::new(token, chat_id)?)
    };

    let (event_tx, event_rx) = mpsc::channel(CHAIN_EVENT_QUEUE_DEPTH);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);

    let dispatcher = Arc::new(EventDispatcher::new(
        tracker.clone(),
        Arc::clone(&config),
        Arc::clone(&native_price),
        Arc::clone(&deployer_history),
        Arc::clone(&signal_engine),
        Arc::clone(&http),
        signal_tx.clone(),
    ));

    let enrichment_fetcher = Arc::new(EnrichmentFetcher::new(
        Arc::clone(&config),
        tracker.clone(),
        Arc::clone(&signal_engine),
        signal_tx,
    ));

    let shutdown = CancellationToken::new();

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn({
        let chain_client = Arc::clone(&chain_client);
        let shutdown = shutdown.clone();
        async move { chain_client.run(event_tx, shutdown).await }
    });
    tasks.spawn({
        let shutdown = shutdown.clone();
        async move { dispatcher.run(event_rx, shutdown).await }
    });
    tasks.spawn({
        let shutdown = shutdown.clone();
        async move { enrichment_fetcher.run(shutdown).await }
    });
    tasks.spawn({
        let feed = Arc::clone(&native_price);
        let config = Arc::clone(&config);
        let shutdown = shutdown.clone();
        async move { run_native_price_poller(feed, reqwest::Client::new(), config, shutdown).await }
    });
    tasks.spawn({
        let tracker = tracker.clone();
        let ttl = config.token_ttl_secs;
        let shutdown = shutdown.clone();
        async move { run_sweeper(tracker, ttl, shutdown).await }
    });
    tasks.spawn({
        let shutdown = shutdown.clone();
        async move { output::run_consumer(signal_rx, output_sender, shutdown).await }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping");
    shutdown.cancel();

    while tasks.join_next().await.is_some() {}

    Ok(())
}
