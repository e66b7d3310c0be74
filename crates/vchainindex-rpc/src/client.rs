//! The node calls the indexer depends on.

use async_trait::async_trait;

use vchainindex_core::error::IndexerError;

use crate::wire::{
    GetBlockDagInfoResponse, GetBlocksRequest, GetBlocksResponse,
    GetVirtualChainFromBlockRequest, GetVirtualChainFromBlockResponse,
};

/// Trait for talking to a chain node.
///
/// Implemented by [`WsNodeClient`](crate::ws::WsNodeClient); tests provide
/// scripted clients.
#[async_trait]
pub trait NodeRpcClient: Send + Sync {
    /// Open the connection. Calling it again on a connected client is a no-op.
    async fn connect(&self) -> Result<(), IndexerError>;

    async fn ping(&self) -> Result<(), IndexerError>;

    async fn get_block_dag_info(&self) -> Result<GetBlockDagInfoResponse, IndexerError>;

    async fn get_blocks(&self, request: GetBlocksRequest)
        -> Result<GetBlocksResponse, IndexerError>;

    async fn get_virtual_chain_from_block(
        &self,
        request: GetVirtualChainFromBlockRequest,
    ) -> Result<GetVirtualChainFromBlockResponse, IndexerError>;
}
