//! The `ChainSource` trait — the engine's only view of the chain node.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{BlockBatch, BlockHash, VirtualChainDelta};

/// Semantic interface over a remote chain node.
///
/// Each call is independent so tests can script the node call by call.
/// Timeouts and transport-level retries belong to the implementation.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Establish the connection. Called once, before any other method.
    async fn connect(&self) -> Result<(), IndexerError>;

    /// Hash the "latest" sentinel resolves to (the node's pruning point).
    async fn resolve_tip_or_pruning_point(&self) -> Result<BlockHash, IndexerError>;

    /// Blocks (with transactions) starting at `from`.
    async fn fetch_blocks(&self, from: &BlockHash) -> Result<BlockBatch, IndexerError>;

    /// Virtual-chain changes since `since`, including accepted transaction ids.
    async fn fetch_virtual_chain_delta(
        &self,
        since: &BlockHash,
    ) -> Result<VirtualChainDelta, IndexerError>;
}
