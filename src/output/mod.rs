//! Delivers a qualifying signal to the downstream executor. The wire format
//! of the messaging transport is intentionally not load-bearing here;
//! `teloxide` stands in for an authenticated bot-style delivery channel
//! behind a narrow trait, so the actual transport is swappable without
//! touching the signal engine or runtime wiring.

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::SignalRecord;

#[async_trait]
pub trait OutputSender: Send + Sync {
    /// Delivery is at-most-once: a failed send is logged and dropped, never
    /// retried. Retrying risks a duplicate buy if the downstream executor
    /// already received the first attempt.
    async fn send(&self, token_address: Address) -> eyre::Result<()>;
}

/// Substitutes a log line for the send. The default sender absent explicit
/// Telegram credentials in config.
pub struct DryRunSender;

#[async_trait]
impl OutputSender for DryRunSender {
    async fn send(&self, token_address: Address) -> eyre::Result<()> {
        info!(%token_address, "dry-run: signal not delivered");
        Ok(())
    }
}

pub struct TelegramSender {
    bot: teloxide::Bot,
    chat_id: teloxide::types::ChatId,
}

impl TelegramSender {
    pub fn new(bot_token: String, chat_id: String) -> eyre::Result<Self> {
        let raw_id: i64 = chat_id
            .parse()
            .map_err(|_| eyre::eyre!("TELEGRAM_CHAT_ID must be a numeric chat id"))?;
        Ok(Self {
            bot: teloxide::Bot::new(bot_token),
            chat_id: teloxide::types::ChatId(raw_id),
        })
    }
}

#[async_trait]
impl OutputSender for TelegramSender {
    async fn send(&self, token_address: Address) -> eyre::Result<()> {
        use teloxide::requests::Requester;
        let body = format!("{token_address:#x}");
        self.bot.send_message(self.chat_id, body).await?;
        Ok(())
    }
}

/// Enqueues onto the bounded outbound queue, dropping with a warning rather
/// than blocking the caller. Applied at every producer rather than inside
/// the channel itself, so a stalled consumer never backs up the pipeline
/// that feeds it.
pub fn enqueue_or_drop(tx: &mpsc::Sender<SignalRecord>, record: SignalRecord) {
    if let Err(e) = tx.try_send(record) {
        warn!(error = %e, "outbound signal queue full, dropping signal");
    }
}

/// Serial consumer task: one send in flight at a time.
pub async fn run_consumer(
    mut rx: mpsc::Receiver<SignalRecord>,
    sender: std::sync::Arc<dyn OutputSender>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_record = rx.recv() => {
                match maybe_record {
                    Some(record) => {
                        if let Err(e) = sender.send(record.token_address).await {
                            warn!(error = %e, token = %record.token_address, "signal delivery failed, dropping");
                        }
                    }
                    None => return,
                }
            }
            _ = shutdown.cancelled() => {
                // Pending signals still in the queue are dropped on shutdown.
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use crate::types::{DexVersion, PairId};

    fn sample_record() -> SignalRecord {
        let token = address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        SignalRecord {
            token_address: token,
            pair_address: PairId::Address(token),
            dex_version: DexVersion::V3,
            emitted_at: 100,
            liquidity_usd: 5000.0,
            estimated_mcap: 12000.0,
            total_buys: 3,
            largest_buy_usd: 600.0,
            deployer: None,
        }
    }

    #[tokio::test]
    async fn dry_run_sender_never_fails() {
        let sender = DryRunSender;
        assert!(sender.send(address!("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")).await.is_ok());
    }

    #[tokio::test]
    async fn full_queue_drops_with_warning_not_panic() {
        let (tx, mut rx) = mpsc::channel(1);
        enqueue_or_drop(&tx, sample_record());
        enqueue_or_drop(&tx, sample_record());
        assert!(rx.recv().await.is_some());
    }
}
