//! [`ChainSource`] over a [`NodeRpcClient`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use vchainindex_core::error::IndexerError;
use vchainindex_core::source::ChainSource;
use vchainindex_core::types::{BlockBatch, BlockHash, VirtualChainDelta};

use crate::client::NodeRpcClient;
use crate::wire::{GetBlocksRequest, GetVirtualChainFromBlockRequest};

/// Chain source that maps the engine's calls onto node RPC calls.
///
/// Every call before a successful [`connect`](ChainSource::connect) fails
/// with a connection error.
pub struct RpcChainSource<C> {
    client: C,
    connected: AtomicBool,
}

impl<C: NodeRpcClient> RpcChainSource<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            connected: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> Result<(), IndexerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(IndexerError::Connection("rpc not connected".into()))
        }
    }
}

#[async_trait]
impl<C: NodeRpcClient> ChainSource for RpcChainSource<C> {
    async fn connect(&self) -> Result<(), IndexerError> {
        self.client.connect().await?;
        self.client
            .ping()
            .await
            .map_err(|e| IndexerError::Connection(e.to_string()))?;
        self.connected.store(true, Ordering::Release);
        info!("rpc connected");
        Ok(())
    }

    async fn resolve_tip_or_pruning_point(&self) -> Result<BlockHash, IndexerError> {
        self.ensure_connected()?;
        let info = self.client.get_block_dag_info().await?;
        if info.pruning_point_hash.is_empty() {
            return Err(IndexerError::Fetch(
                "node reported an empty pruning point".into(),
            ));
        }
        debug!(pruning_point = %info.pruning_point_hash, "resolved tip sentinel");
        Ok(info.pruning_point_hash)
    }

    async fn fetch_blocks(&self, from: &BlockHash) -> Result<BlockBatch, IndexerError> {
        self.ensure_connected()?;
        let resp = self
            .client
            .get_blocks(GetBlocksRequest::with_transactions(from.clone()))
            .await?;
        let (blocks, hashes) = (resp.blocks.len(), resp.block_hashes.len());
        BlockBatch::from_parts(resp.blocks, resp.block_hashes).ok_or_else(|| {
            IndexerError::Fetch(format!(
                "getBlocks returned {blocks} blocks for {hashes} hashes"
            ))
        })
    }

    async fn fetch_virtual_chain_delta(
        &self,
        since: &BlockHash,
    ) -> Result<VirtualChainDelta, IndexerError> {
        self.ensure_connected()?;
        self.client
            .get_virtual_chain_from_block(GetVirtualChainFromBlockRequest::with_accepted_ids(
                since.clone(),
            ))
            .await
    }
}
