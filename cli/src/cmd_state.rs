//! `vchainindex status` and `vchainindex reset`

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use vchainindex_core::checkpoint::CheckpointManager;
use vchainindex_storage::SqliteStorage;

async fn open(db: &Path) -> Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::open(&db.to_string_lossy())
        .await
        .with_context(|| format!("opening database {}", db.display()))?;
    Ok(Arc::new(storage))
}

pub async fn status(db: &Path, id: &str, as_json: bool) -> Result<()> {
    let storage = open(db).await?;
    let manager = CheckpointManager::new(storage.clone(), id)?;
    let checkpoint = manager.load().await?;
    let updated_at = storage.checkpoint_updated_at(manager.namespace()).await?;
    let transactions = storage.transaction_count().await?;

    if as_json {
        let out = serde_json::json!({
            "id": id,
            "namespace": manager.namespace(),
            "nextBlock": checkpoint.next_block.as_ref().map(|n| n.to_string()),
            "lastKnownChainBlock": checkpoint.last_known_chain_block.as_ref().map(|h| h.to_string()),
            "updatedAt": updated_at.map(|t| t.to_rfc3339()),
            "transactions": transactions,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Indexer:    {id} ({})", manager.namespace());
    match &checkpoint.next_block {
        Some(next) => println!("Next block: {next}"),
        None => println!("Next block: (none, will poll the tip)"),
    }
    match &checkpoint.last_known_chain_block {
        Some(reference) => println!("Chain ref:  {reference}"),
        None => println!("Chain ref:  (none)"),
    }
    if let Some(t) = updated_at {
        println!("Updated:    {}", t.to_rfc3339());
    }
    println!("Stored transactions: {transactions}");
    Ok(())
}

pub async fn reset(db: &Path, id: &str) -> Result<()> {
    let storage = open(db).await?;
    let manager = CheckpointManager::new(storage, id)?;
    manager.clear().await?;
    println!("Checkpoint cleared for {}", manager.namespace());
    Ok(())
}
