//! In-memory storage backend.
//!
//! Stores checkpoint fields, indexed-block markers and accepted transactions
//! in RAM. Useful for testing and short-lived indexers that don't need
//! persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use vchainindex_core::checkpoint::{CheckpointField, CheckpointStore, NextBlock};
use vchainindex_core::error::IndexerError;
use vchainindex_core::handler::{IndexedStep, TransactionHandler};
use vchainindex_core::types::{AcceptedTransaction, BlockHash, TransactionId};

/// An accepted transaction as kept by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    pub transaction: AcceptedTransaction,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Default)]
struct Fields {
    values: HashMap<String, HashMap<&'static str, String>>,
    updated_at: HashMap<String, DateTime<Utc>>,
}

/// Transactions in first-accepted order, indexed by id.
#[derive(Default)]
struct Transactions {
    rows: Vec<StoredTransaction>,
    by_id: HashMap<TransactionId, usize>,
}

impl Transactions {
    /// Append the transactions not stored yet. Returns how many were new.
    fn insert(&mut self, batch: &[AcceptedTransaction]) -> usize {
        let now = Utc::now();
        let before = self.rows.len();
        for tx in batch {
            let Some(id) = tx.id() else { continue };
            if self.by_id.contains_key(id) {
                continue;
            }
            self.by_id.insert(id.clone(), self.rows.len());
            self.rows.push(StoredTransaction {
                transaction: tx.clone(),
                indexed_at: now,
            });
        }
        self.rows.len() - before
    }

    fn get(&self, id: &TransactionId) -> Option<&StoredTransaction> {
        self.by_id.get(id).and_then(|&i| self.rows.get(i))
    }
}

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    fields: Mutex<Fields>,
    indexed_blocks: Mutex<HashSet<BlockHash>>,
    transactions: Mutex<Transactions>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, IndexerError> {
    mutex
        .lock()
        .map_err(|_| IndexerError::Storage("in-memory storage lock poisoned".into()))
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored transactions, in the order they were first accepted.
    pub fn transactions(&self) -> Result<Vec<StoredTransaction>, IndexerError> {
        Ok(lock(&self.transactions)?.rows.clone())
    }

    /// Look up a stored transaction by id.
    pub fn transaction(&self, id: &TransactionId) -> Result<Option<StoredTransaction>, IndexerError> {
        Ok(lock(&self.transactions)?.get(id).cloned())
    }

    /// Transactions accepted by the given chain block.
    pub fn transactions_by_block(
        &self,
        accepting_block: &BlockHash,
    ) -> Result<Vec<StoredTransaction>, IndexerError> {
        Ok(lock(&self.transactions)?
            .rows
            .iter()
            .filter(|t| &t.transaction.accepting_block_hash == accepting_block)
            .cloned()
            .collect())
    }

    /// Total number of stored transactions.
    pub fn transaction_count(&self) -> Result<usize, IndexerError> {
        Ok(lock(&self.transactions)?.rows.len())
    }

    /// When the namespace's checkpoint was last written.
    pub fn checkpoint_updated_at(
        &self,
        namespace: &str,
    ) -> Result<Option<DateTime<Utc>>, IndexerError> {
        Ok(lock(&self.fields)?.updated_at.get(namespace).copied())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn get_field(
        &self,
        namespace: &str,
        field: CheckpointField,
    ) -> Result<Option<String>, IndexerError> {
        Ok(lock(&self.fields)?
            .values
            .get(namespace)
            .and_then(|f| f.get(field.as_str()))
            .cloned())
    }

    async fn set_next(
        &self,
        namespace: &str,
        next_block: &NextBlock,
        last_known_chain_block: Option<&BlockHash>,
    ) -> Result<(), IndexerError> {
        let mut fields = lock(&self.fields)?;
        let values = fields.values.entry(namespace.to_string()).or_default();
        values.insert(
            CheckpointField::NextBlock.as_str(),
            next_block.as_stored().to_string(),
        );
        match last_known_chain_block {
            Some(hash) => {
                values.insert(
                    CheckpointField::LastKnownChainBlock.as_str(),
                    hash.to_string(),
                );
            }
            None => {
                values.remove(CheckpointField::LastKnownChainBlock.as_str());
            }
        }
        fields.updated_at.insert(namespace.to_string(), Utc::now());
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), IndexerError> {
        let mut fields = lock(&self.fields)?;
        fields.values.remove(namespace);
        fields.updated_at.remove(namespace);
        Ok(())
    }

    async fn is_block_indexed(&self, hash: &BlockHash) -> Result<bool, IndexerError> {
        Ok(lock(&self.indexed_blocks)?.contains(hash))
    }

    async fn mark_block_indexed(&self, hash: &BlockHash) -> Result<(), IndexerError> {
        lock(&self.indexed_blocks)?.insert(hash.clone());
        Ok(())
    }
}

#[async_trait]
impl TransactionHandler for InMemoryStorage {
    /// Store each transaction once; a replayed batch is a no-op.
    async fn on_accepted_transactions(
        &self,
        batch: &[AcceptedTransaction],
    ) -> Result<(), IndexerError> {
        lock(&self.transactions)?.insert(batch);
        Ok(())
    }

    /// Store the step's transactions, then mark its start block indexed.
    async fn on_step(&self, step: &IndexedStep<'_>) -> Result<(), IndexerError> {
        let added = lock(&self.transactions)?.insert(step.transactions);
        lock(&self.indexed_blocks)?.insert(step.from.clone());
        tracing::debug!(from = %step.from, added, "stored step");
        Ok(())
    }

    fn name(&self) -> &str {
        "memory-storage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchainindex_core::types::{BlockBatch, Transaction, TransactionVerboseData};

    fn accepted(id: &str, block: &str) -> AcceptedTransaction {
        AcceptedTransaction {
            transaction: Transaction {
                verbose_data: Some(TransactionVerboseData {
                    transaction_id: id.into(),
                    hash: String::new(),
                    compute_mass: 0,
                    block_hash: BlockHash::default(),
                    block_time: 0,
                }),
                ..Default::default()
            },
            accepting_block_hash: block.into(),
        }
    }

    #[tokio::test]
    async fn checkpoint_fields_roundtrip() {
        let store = InMemoryStorage::new();
        store
            .set_next("ns", &NextBlock::Hash("b2".into()), Some(&"c1".into()))
            .await
            .unwrap();

        let next = store.get_field("ns", CheckpointField::NextBlock).await.unwrap();
        let reference = store
            .get_field("ns", CheckpointField::LastKnownChainBlock)
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("b2"));
        assert_eq!(reference.as_deref(), Some("c1"));
        assert!(store.checkpoint_updated_at("ns").unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_reference_removes_the_stored_one() {
        let store = InMemoryStorage::new();
        store
            .set_next("ns", &NextBlock::Hash("b2".into()), Some(&"c1".into()))
            .await
            .unwrap();
        store.set_next("ns", &NextBlock::Tip, None).await.unwrap();

        let next = store.get_field("ns", CheckpointField::NextBlock).await.unwrap();
        assert_eq!(next.as_deref(), Some("latest"));
        assert!(store
            .get_field("ns", CheckpointField::LastKnownChainBlock)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn clear_only_touches_its_namespace() {
        let store = InMemoryStorage::new();
        store.set_next("a", &NextBlock::Tip, None).await.unwrap();
        store.set_next("b", &NextBlock::Tip, None).await.unwrap();
        store.clear("a").await.unwrap();

        assert!(store.get_field("a", CheckpointField::NextBlock).await.unwrap().is_none());
        assert!(store.get_field("b", CheckpointField::NextBlock).await.unwrap().is_some());
        assert!(store.checkpoint_updated_at("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn block_markers() {
        let store = InMemoryStorage::new();
        let hash = BlockHash::from("b1");
        assert!(!store.is_block_indexed(&hash).await.unwrap());
        store.mark_block_indexed(&hash).await.unwrap();
        store.mark_block_indexed(&hash).await.unwrap();
        assert!(store.is_block_indexed(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn replayed_batch_is_stored_once() {
        let store = InMemoryStorage::new();
        let batch = vec![accepted("t1", "c1"), accepted("t2", "c1")];
        store.on_accepted_transactions(&batch).await.unwrap();
        store.on_accepted_transactions(&batch).await.unwrap();
        store
            .on_accepted_transactions(&[accepted("t3", "c2")])
            .await
            .unwrap();

        assert_eq!(store.transaction_count().unwrap(), 3);
        assert_eq!(store.transactions_by_block(&"c1".into()).unwrap().len(), 2);
        let t3 = store.transaction(&"t3".into()).unwrap().unwrap();
        assert_eq!(t3.transaction.accepting_block_hash.as_str(), "c2");
    }

    #[tokio::test]
    async fn lookup_by_id_follows_insertion_order() {
        let store = InMemoryStorage::new();
        store
            .on_accepted_transactions(&[accepted("t1", "c1"), accepted("t2", "c1")])
            .await
            .unwrap();
        // t2 again, accepted by a later block: the first record stays.
        store
            .on_accepted_transactions(&[accepted("t2", "c9"), accepted("t3", "c2")])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .transactions()
            .unwrap()
            .iter()
            .filter_map(|t| t.transaction.id().map(|id| id.to_string()))
            .collect();
        assert_eq!(ids, ["t1", "t2", "t3"]);
        let t2 = store.transaction(&"t2".into()).unwrap().unwrap();
        assert_eq!(t2.transaction.accepting_block_hash.as_str(), "c1");
        assert!(store.transaction(&"t4".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn step_marks_its_start_block() {
        let store = InMemoryStorage::new();
        let from = BlockHash::from("b1");
        let blocks = BlockBatch::default();
        let txs = [accepted("t1", "c1")];
        let step = IndexedStep {
            from: &from,
            transactions: &txs,
            blocks: &blocks,
            last_chain_block: None,
        };

        store.on_step(&step).await.unwrap();
        assert!(store.is_block_indexed(&from).await.unwrap());
        assert!(!store.is_block_indexed(&"c1".into()).await.unwrap());
        assert_eq!(store.transaction_count().unwrap(), 1);
    }
}
