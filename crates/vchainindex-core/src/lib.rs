//! vchainindex-core — foundation for the resumable virtual-chain indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexingEngine
//!     ├── ChainSource          (node: pruning point, blocks, virtual-chain deltas)
//!     ├── VirtualChainResolver (reorg pruning, acceptance, dedup)
//!     ├── CheckpointManager    (resume cursor + indexed-block markers)
//!     └── HandlerRegistry      (user transaction handlers)
//! ```

pub mod checkpoint;
pub mod engine;
pub mod error;
pub mod handler;
pub mod indexer;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod types;

pub use checkpoint::{
    Checkpoint, CheckpointField, CheckpointManager, CheckpointStore, CheckpointUpdate,
    MemoryCheckpointStore, NextBlock,
};
pub use engine::IndexingEngine;
pub use error::IndexerError;
pub use handler::{HandlerRegistry, IndexedStep, LoggingHandler, TransactionHandler};
pub use indexer::{IndexerConfig, IndexerState};
pub use resolver::{Resolution, VirtualChainResolver};
pub use source::ChainSource;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AcceptedTransaction, AcceptedTransactionIds, Block, BlockBatch, BlockHash, BlockHeader,
    Transaction, TransactionId, VirtualChainDelta,
};
