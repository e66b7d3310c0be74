//! Virtual-chain reconciliation.
//!
//! Given a batch of blocks and the virtual-chain delta covering it, the
//! resolver:
//! 1. drops blocks the delta reports as removed from the chain (reorg),
//! 2. maps every accepted transaction id to its accepting block,
//! 3. walks the surviving transactions in block order and keeps the first
//!    occurrence of each accepted id,
//! 4. reports the last accepting block as the reference for the next delta.
//!
//! No I/O; malformed input is excluded rather than reported.

use std::collections::{HashMap, HashSet};

use crate::types::{
    AcceptedTransaction, BlockBatch, BlockHash, TransactionId, VirtualChainDelta,
};

/// Output of one resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Accepted transactions, deduplicated, in block then intra-block order.
    pub valid_transactions: Vec<AcceptedTransaction>,
    /// The input batch minus removed chain blocks.
    pub pruned_batch: BlockBatch,
    /// Last accepting block in the delta; `None` if nothing was accepted.
    pub next_reference: Option<BlockHash>,
}

/// Stateless reconciliation of a block batch against a virtual-chain delta.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualChainResolver;

impl VirtualChainResolver {
    pub fn resolve(batch: BlockBatch, delta: &VirtualChainDelta) -> Resolution {
        let pruned_batch = Self::prune_removed(batch, &delta.removed_chain_block_hashes);
        let accepted = Self::acceptance_map(delta);
        let valid_transactions = Self::accepted_transactions(&pruned_batch, &accepted);
        let next_reference = Self::next_reference(delta);

        tracing::debug!(
            blocks = pruned_batch.len(),
            txs = pruned_batch.transactions().count(),
            valid = valid_transactions.len(),
            next_reference = ?next_reference,
            "virtual chain resolved"
        );

        Resolution {
            valid_transactions,
            pruned_batch,
            next_reference,
        }
    }

    /// Remove every block whose hash is in `removed`, keeping relative order.
    pub fn prune_removed(batch: BlockBatch, removed: &[BlockHash]) -> BlockBatch {
        if removed.is_empty() {
            return batch;
        }
        let removed: HashSet<&BlockHash> = removed.iter().collect();
        batch.retain(|b| !removed.contains(b.hash()))
    }

    /// Transaction id → accepting block. Later entries win on collision.
    pub fn acceptance_map(delta: &VirtualChainDelta) -> HashMap<&TransactionId, &BlockHash> {
        let mut map = HashMap::new();
        for entry in &delta.accepted_transaction_ids {
            for id in &entry.accepted_transaction_ids {
                map.insert(id, &entry.accepting_block_hash);
            }
        }
        map
    }

    /// Accepted transactions of `batch`, first occurrence of each id only.
    pub fn accepted_transactions(
        batch: &BlockBatch,
        accepted: &HashMap<&TransactionId, &BlockHash>,
    ) -> Vec<AcceptedTransaction> {
        let mut emitted: HashSet<&TransactionId> = HashSet::new();
        let mut out = Vec::new();

        for tx in batch.transactions() {
            let Some(id) = tx.id() else { continue };
            let Some(accepting) = accepted.get(id) else { continue };
            if !emitted.insert(id) {
                continue;
            }
            out.push(AcceptedTransaction {
                transaction: tx.clone(),
                accepting_block_hash: (*accepting).clone(),
            });
        }
        out
    }

    /// Accepting block of the last delta entry.
    pub fn next_reference(delta: &VirtualChainDelta) -> Option<BlockHash> {
        delta
            .accepted_transaction_ids
            .last()
            .map(|entry| entry.accepting_block_hash.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AcceptedTransactionIds, Block, BlockHeader, Transaction, TransactionVerboseData,
    };

    fn tx(id: Option<&str>) -> Transaction {
        Transaction {
            payload: id.unwrap_or("anon").to_string(),
            verbose_data: id.map(|id| TransactionVerboseData {
                transaction_id: id.into(),
                hash: String::new(),
                compute_mass: 0,
                block_hash: BlockHash::default(),
                block_time: 0,
            }),
            ..Default::default()
        }
    }

    fn block(hash: &str, txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                hash: hash.into(),
                ..Default::default()
            },
            transactions: txs,
        }
    }

    fn accepted(block: &str, ids: &[&str]) -> AcceptedTransactionIds {
        AcceptedTransactionIds {
            accepting_block_hash: block.into(),
            accepted_transaction_ids: ids.iter().map(|id| (*id).into()).collect(),
        }
    }

    fn ids(res: &Resolution) -> Vec<(&str, &str)> {
        res.valid_transactions
            .iter()
            .map(|a| (a.id().unwrap().as_str(), a.accepting_block_hash.as_str()))
            .collect()
    }

    #[test]
    fn emits_only_accepted_transactions() {
        let batch = BlockBatch::new(vec![
            block("b0", vec![tx(Some("t1")), tx(Some("t2"))]),
            block("b1", vec![tx(Some("t3"))]),
        ]);
        let delta = VirtualChainDelta {
            accepted_transaction_ids: vec![accepted("B1", &["t1", "t2"])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(ids(&res), vec![("t1", "B1"), ("t2", "B1")]);
        assert_eq!(res.next_reference, Some("B1".into()));
    }

    #[test]
    fn prunes_removed_chain_blocks() {
        let batch = BlockBatch::new(vec![
            block("B1", vec![]),
            block("B2", vec![]),
            block("B3", vec![]),
        ]);
        let delta = VirtualChainDelta {
            removed_chain_block_hashes: vec!["B2".into()],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(
            res.pruned_batch.hashes(),
            &[BlockHash::from("B1"), BlockHash::from("B3")]
        );
        assert_eq!(res.pruned_batch.len(), 2);
    }

    #[test]
    fn transactions_of_removed_blocks_are_never_emitted() {
        let batch = BlockBatch::new(vec![
            block("B1", vec![tx(Some("t1"))]),
            block("B2", vec![tx(Some("t2"))]),
        ]);
        let delta = VirtualChainDelta {
            removed_chain_block_hashes: vec!["B2".into()],
            accepted_transaction_ids: vec![accepted("C1", &["t1", "t2"])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(ids(&res), vec![("t1", "C1")]);
    }

    #[test]
    fn duplicate_transaction_emitted_once() {
        let batch = BlockBatch::new(vec![
            block("B1", vec![tx(Some("t1")), tx(Some("t2"))]),
            block("B2", vec![tx(Some("t1"))]),
        ]);
        let delta = VirtualChainDelta {
            accepted_transaction_ids: vec![accepted("C1", &["t1", "t2"])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(ids(&res), vec![("t1", "C1"), ("t2", "C1")]);
    }

    #[test]
    fn transactions_without_id_are_excluded() {
        let batch = BlockBatch::new(vec![block("B1", vec![tx(None), tx(Some("t1"))])]);
        let delta = VirtualChainDelta {
            accepted_transaction_ids: vec![accepted("C1", &["t1", ""])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(res.valid_transactions.len(), 1);
        assert!(res.valid_transactions.iter().all(|a| a.id().is_some()));
    }

    #[test]
    fn later_accepting_block_wins_on_collision() {
        let batch = BlockBatch::new(vec![block("B1", vec![tx(Some("t1"))])]);
        let delta = VirtualChainDelta {
            accepted_transaction_ids: vec![accepted("C1", &["t1"]), accepted("C2", &["t1"])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert_eq!(ids(&res), vec![("t1", "C2")]);
        assert_eq!(res.next_reference, Some("C2".into()));
    }

    #[test]
    fn empty_acceptance_leaves_reference_unset() {
        let batch = BlockBatch::new(vec![block("B1", vec![tx(Some("t1"))])]);
        let res = VirtualChainResolver::resolve(batch, &VirtualChainDelta::default());
        assert!(res.valid_transactions.is_empty());
        assert!(res.next_reference.is_none());
    }

    #[test]
    fn accepted_ids_outside_batch_are_ignored() {
        let batch = BlockBatch::new(vec![block("B1", vec![tx(Some("t1"))])]);
        let delta = VirtualChainDelta {
            accepted_transaction_ids: vec![accepted("C1", &["t9"])],
            ..Default::default()
        };

        let res = VirtualChainResolver::resolve(batch, &delta);
        assert!(res.valid_transactions.is_empty());
        assert_eq!(res.next_reference, Some("C1".into()));
    }
}
