//! Request and response bodies of the node calls the indexer uses.
//!
//! Field names follow the node's camelCase JSON encoding.

use serde::{Deserialize, Serialize};

use vchainindex_core::types::{Block, BlockHash, VirtualChainDelta};

pub const GET_BLOCK_DAG_INFO: &str = "getBlockDagInfo";
pub const GET_BLOCKS: &str = "getBlocks";
pub const GET_VIRTUAL_CHAIN_FROM_BLOCK: &str = "getVirtualChainFromBlock";
pub const PING: &str = "ping";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetBlockDagInfoResponse {
    pub network: String,
    pub block_count: u64,
    pub header_count: u64,
    pub tip_hashes: Vec<BlockHash>,
    pub difficulty: f64,
    pub past_median_time: u64,
    pub virtual_parent_hashes: Vec<BlockHash>,
    pub pruning_point_hash: BlockHash,
    pub virtual_daa_score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBlocksRequest {
    pub low_hash: Option<BlockHash>,
    pub include_blocks: bool,
    pub include_transactions: bool,
}

impl GetBlocksRequest {
    /// Full blocks with transactions, starting at `low_hash`.
    pub fn with_transactions(low_hash: BlockHash) -> Self {
        Self {
            low_hash: Some(low_hash),
            include_blocks: true,
            include_transactions: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetBlocksResponse {
    pub block_hashes: Vec<BlockHash>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVirtualChainFromBlockRequest {
    pub start_hash: BlockHash,
    pub include_accepted_transaction_ids: bool,
}

impl GetVirtualChainFromBlockRequest {
    pub fn with_accepted_ids(start_hash: BlockHash) -> Self {
        Self {
            start_hash,
            include_accepted_transaction_ids: true,
        }
    }
}

/// The virtual-chain response has exactly the shape of the core delta.
pub type GetVirtualChainFromBlockResponse = VirtualChainDelta;
