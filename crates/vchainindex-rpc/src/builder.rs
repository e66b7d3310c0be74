//! Fluent builder API for creating node-backed indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vchainindex_core::{HandlerRegistry, LoggingHandler, MemoryCheckpointStore};
//! use vchainindex_rpc::IndexerBuilder;
//!
//! # fn main() -> Result<(), vchainindex_core::IndexerError> {
//! let engine = IndexerBuilder::new()
//!     .id("payments")
//!     .url("ws://127.0.0.1:18110")
//!     .retry(3)
//!     .poll_interval_ms(2_000)
//!     .build(
//!         Arc::new(MemoryCheckpointStore::new()),
//!         HandlerRegistry::new().with(Arc::new(LoggingHandler)),
//!     )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use vchainindex_core::checkpoint::CheckpointStore;
use vchainindex_core::engine::IndexingEngine;
use vchainindex_core::error::IndexerError;
use vchainindex_core::handler::HandlerRegistry;
use vchainindex_core::indexer::IndexerConfig;
use vchainindex_core::types::BlockHash;

use crate::source::RpcChainSource;
use crate::ws::{WsClientConfig, WsNodeClient};

/// Mainnet wRPC endpoint with JSON encoding on a local node.
pub const DEFAULT_NODE_URL: &str = "ws://127.0.0.1:18110";

/// Fluent builder for `IndexerConfig` and the wRPC-backed engine.
pub struct IndexerBuilder {
    config: IndexerConfig,
    url: String,
    ws: WsClientConfig,
}

impl Default for IndexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
            url: DEFAULT_NODE_URL.into(),
            ws: WsClientConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: IndexerConfig) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the start block. Blank hashes mean the pruning point.
    pub fn from_block(mut self, hash: impl Into<BlockHash>) -> Self {
        let hash = hash.into();
        self.config.from_block = (!hash.is_empty()).then_some(hash);
        self
    }

    /// Set retries per bootstrap and per loop iteration.
    pub fn retry(mut self, retry: u32) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the tip polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the node's wRPC (JSON encoding) endpoint.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set how long each node call waits for its response.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.ws.request_timeout = timeout;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Build an engine talking to the configured node over wRPC. The
    /// socket is opened when the engine starts.
    pub fn build(
        self,
        store: Arc<dyn CheckpointStore>,
        handlers: HandlerRegistry,
    ) -> Result<IndexingEngine<RpcChainSource<WsNodeClient>>, IndexerError> {
        let client = WsNodeClient::new(self.url, self.ws);
        IndexingEngine::new(self.config, RpcChainSource::new(client), store, handlers)
    }
}
