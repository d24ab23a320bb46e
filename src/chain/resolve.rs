//! Best-effort deployer resolution. This walks the pool-creation block
//! looking for the contract-creation transaction whose receipt names the
//! token as `contract_address`, resolving on-chain facts with plain
//! one-shot RPCs rather than a trace API.
//!
//! Limitation: only the pool-creation block itself is scanned. A token
//! deployed in an earlier block than its pool resolves to `None` rather
//! than walking further back. Acceptable given the deployer field is an
//! auxiliary anti-spam signal, not something the rest of the pipeline
//! depends on for correctness.

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::eth::BlockTransactionsKind;
use tracing::debug;

use super::HttpProvider;

pub async fn resolve_deployer(
    provider: &HttpProvider,
    token: Address,
    block_number: u64,
) -> eyre::Result<Option<Address>> {
    let block = provider
        .get_block_by_number(block_number.into(), BlockTransactionsKind::Full)
        .await?;
    let Some(block) = block else {
        return Ok(None);
    };
    let Some(txs) = block.transactions.as_transactions() else {
        return Ok(None);
    };

    for tx in txs {
        if tx.to.is_some() {
            continue; // not a contract-creation transaction
        }
        match provider.get_transaction_receipt(tx.hash).await {
            Ok(Some(receipt)) if receipt.contract_address == Some(token) => {
                return Ok(Some(tx.from));
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, tx_hash = %tx.hash, "failed to fetch receipt while resolving deployer");
                continue;
            }
        }
    }

    Ok(None)
}
