//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockHash;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used to namespace checkpoint keys).
    pub id: String,
    /// First block to index. `None` = the node's pruning point.
    pub from_block: Option<BlockHash>,
    /// Retries per bootstrap / loop iteration (0 = a single attempt).
    pub retry: u32,
    /// Sleep before polling the tip when there is no checkpoint (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            from_block: None,
            retry: 0,
            poll_interval_ms: 1000,
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.id.trim().is_empty() {
            return Err(IndexerError::Config("indexer id must not be empty".into()));
        }
        Ok(())
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Constructed, not started.
    Uninitialized,
    /// Connected; running the first step from the configured start block.
    Bootstrapping,
    /// Following the checkpoint in the steady loop.
    Live,
    /// Cancelled at an iteration boundary.
    Stopped,
    /// Retries exhausted; the last error was returned to the caller.
    Failed,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::Live => write!(f, "live"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
