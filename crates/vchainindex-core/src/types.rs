//! Shared types for the indexing pipeline.
//!
//! Field names serialize in camelCase so that node responses deserialize
//! straight into these types.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Identifiers ──────────────────────────────────────────────────────────────

/// Hex-encoded block hash. Compared by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty string, which nodes use as "no hash".
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Hex-encoded transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// Block header with the DAG metadata the indexer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockHeader {
    pub hash: BlockHash,
    pub version: u16,
    /// Parents grouped by level; level 0 holds the direct parents.
    pub parents_by_level: Vec<Vec<BlockHash>>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub daa_score: u64,
    pub blue_score: u64,
    pub blue_work: String,
    pub pruning_point: BlockHash,
}

impl BlockHeader {
    /// Direct (level 0) parents of the block.
    pub fn parent_hashes(&self) -> &[BlockHash] {
        self.parents_by_level.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A block as fetched from the node. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> &BlockHash {
        &self.header.hash
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Outpoint {
    pub transaction_id: String,
    pub index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionInput {
    pub previous_outpoint: Outpoint,
    pub signature_script: String,
    pub sequence: u64,
    pub sig_op_count: u8,
}

/// Script public key; nodes emit it either as a bare hex string or as an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptPublicKey {
    Hex(String),
    Versioned { version: u16, script: String },
}

impl Default for ScriptPublicKey {
    fn default() -> Self {
        Self::Hex(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_public_key: ScriptPublicKey,
}

/// Node-provided extras; only present when the node runs with verbose data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionVerboseData {
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub compute_mass: u64,
    #[serde(default)]
    pub block_hash: BlockHash,
    #[serde(default)]
    pub block_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    pub version: u16,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u64,
    pub subnetwork_id: String,
    pub gas: u64,
    pub payload: String,
    pub mass: u64,
    pub verbose_data: Option<TransactionVerboseData>,
}

impl Transaction {
    /// The transaction id, if the node supplied verbose data with a non-empty id.
    ///
    /// Transactions without an id can never be resolved as accepted.
    pub fn id(&self) -> Option<&TransactionId> {
        self.verbose_data
            .as_ref()
            .map(|v| &v.transaction_id)
            .filter(|id| !id.as_str().is_empty())
    }
}

// ─── BlockBatch ───────────────────────────────────────────────────────────────

/// Blocks returned by one fetch, plus their hashes in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBatch {
    blocks: Vec<Block>,
    hashes: Vec<BlockHash>,
}

impl BlockBatch {
    /// Build a batch from blocks; the hash list is derived from the headers.
    pub fn new(blocks: Vec<Block>) -> Self {
        let hashes = blocks.iter().map(|b| b.hash().clone()).collect();
        Self { blocks, hashes }
    }

    /// Build a batch from a node response that carries both lists.
    ///
    /// Returns `None` when the two lists disagree in length or order.
    pub fn from_parts(blocks: Vec<Block>, hashes: Vec<BlockHash>) -> Option<Self> {
        let aligned = blocks.len() == hashes.len()
            && blocks.iter().zip(&hashes).all(|(b, h)| b.hash() == h);
        aligned.then_some(Self { blocks, hashes })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn hashes(&self) -> &[BlockHash] {
        &self.hashes
    }

    /// The natural continuation point for the next fetch.
    pub fn last_hash(&self) -> Option<&BlockHash> {
        self.hashes.last()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Keep only the blocks matching `keep`, preserving order.
    pub fn retain(self, mut keep: impl FnMut(&Block) -> bool) -> Self {
        Self::new(self.blocks.into_iter().filter(|b| keep(b)).collect())
    }

    /// All transactions, in block order then intra-block order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter())
    }
}

// ─── Virtual chain ────────────────────────────────────────────────────────────

/// Transaction ids accepted by one chain block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTransactionIds {
    pub accepting_block_hash: BlockHash,
    #[serde(default)]
    pub accepted_transaction_ids: Vec<TransactionId>,
}

/// Changes to the virtual chain since a reference block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualChainDelta {
    /// Blocks that left the selected chain since the reference point.
    pub removed_chain_block_hashes: Vec<BlockHash>,
    pub added_chain_block_hashes: Vec<BlockHash>,
    /// Accepted ids per accepting block, in chain order.
    pub accepted_transaction_ids: Vec<AcceptedTransactionIds>,
}

/// A transaction together with the chain block that accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTransaction {
    pub transaction: Transaction,
    pub accepting_block_hash: BlockHash,
}

impl AcceptedTransaction {
    /// Id of the accepted transaction. Always present for resolver output.
    pub fn id(&self) -> Option<&TransactionId> {
        self.transaction.id()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn block(hash: &str) -> Block {
        Block {
            header: BlockHeader {
                hash: hash.into(),
                ..Default::default()
            },
            transactions: vec![],
        }
    }

    #[test]
    fn batch_hashes_follow_blocks() {
        let batch = BlockBatch::new(vec![block("aa"), block("bb")]);
        assert_eq!(batch.hashes(), &[BlockHash::from("aa"), BlockHash::from("bb")]);
        assert_eq!(batch.last_hash().unwrap().as_str(), "bb");
    }

    #[test]
    fn from_parts_rejects_misaligned_lists() {
        let ok = BlockBatch::from_parts(vec![block("aa")], vec!["aa".into()]);
        assert!(ok.is_some());

        let swapped = BlockBatch::from_parts(
            vec![block("aa"), block("bb")],
            vec!["bb".into(), "aa".into()],
        );
        assert!(swapped.is_none());

        let short = BlockBatch::from_parts(vec![block("aa")], vec![]);
        assert!(short.is_none());
    }

    #[test]
    fn transaction_without_verbose_id_has_no_id() {
        let mut tx = Transaction::default();
        assert!(tx.id().is_none());

        tx.verbose_data = Some(TransactionVerboseData {
            transaction_id: TransactionId::new(""),
            hash: String::new(),
            compute_mass: 0,
            block_hash: BlockHash::default(),
            block_time: 0,
        });
        assert!(tx.id().is_none());
    }

    #[test]
    fn delta_deserializes_from_node_json() {
        let json = r#"{
            "removedChainBlockHashes": ["b2"],
            "addedChainBlockHashes": ["b4"],
            "acceptedTransactionIds": [
                { "acceptingBlockHash": "b4", "acceptedTransactionIds": ["t1", "t2"] }
            ]
        }"#;
        let delta: VirtualChainDelta = serde_json::from_str(json).unwrap();
        assert_eq!(delta.removed_chain_block_hashes, vec![BlockHash::from("b2")]);
        assert_eq!(delta.accepted_transaction_ids[0].accepted_transaction_ids.len(), 2);
    }

    #[test]
    fn block_deserializes_with_partial_fields() {
        let json = r#"{
            "header": { "hash": "aa", "parentsByLevel": [["p1", "p2"], ["p3"]], "timestamp": 1700000000000 },
            "transactions": [
                { "payload": "", "verboseData": { "transactionId": "t1" } },
                { "outputs": [ { "value": 5, "scriptPublicKey": "20ab" } ] }
            ]
        }"#;
        let block: Block = serde_json::from_str(json).unwrap();
        assert_eq!(block.header.parent_hashes().len(), 2);
        assert_eq!(block.transactions[0].id().unwrap().as_str(), "t1");
        assert!(block.transactions[1].id().is_none());
    }
}
