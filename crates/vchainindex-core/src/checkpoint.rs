//! Checkpoint manager — persists the indexer's resume cursor.
//!
//! A checkpoint is two fields stored under the indexer's namespace: the next
//! block to fetch and the last virtual-chain block the resolver reported. On
//! restart the engine reads both and continues from there instead of the
//! pruning point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::BlockHash;

/// Stored value meaning "resolve to the node's current tip on the next read".
pub const TIP_SENTINEL: &str = "latest";

// ─── NextBlock ────────────────────────────────────────────────────────────────

/// Where the next fetch starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextBlock {
    /// A concrete block hash.
    Hash(BlockHash),
    /// Resolve to the node's tip / pruning point when the step runs.
    Tip,
}

impl NextBlock {
    /// Parse a stored field. Empty values count as "no checkpoint".
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value {
            "" => None,
            TIP_SENTINEL => Some(Self::Tip),
            hash => Some(Self::Hash(BlockHash::new(hash))),
        }
    }

    /// The string written to the store.
    pub fn as_stored(&self) -> &str {
        match self {
            Self::Hash(h) => h.as_str(),
            Self::Tip => TIP_SENTINEL,
        }
    }

    pub fn is_tip(&self) -> bool {
        matches!(self, Self::Tip)
    }
}

impl fmt::Display for NextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_stored())
    }
}

impl From<Option<BlockHash>> for NextBlock {
    fn from(hash: Option<BlockHash>) -> Self {
        match hash {
            Some(h) if !h.is_empty() => Self::Hash(h),
            _ => Self::Tip,
        }
    }
}

// ─── Checkpoint ───────────────────────────────────────────────────────────────

/// The two fields kept per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointField {
    NextBlock,
    LastKnownChainBlock,
}

impl CheckpointField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextBlock => "next_block",
            Self::LastKnownChainBlock => "last_known_chain_block",
        }
    }
}

impl fmt::Display for CheckpointField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded checkpoint. Both fields absent means "no checkpoint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub next_block: Option<NextBlock>,
    pub last_known_chain_block: Option<BlockHash>,
}

// ─── CheckpointStore ──────────────────────────────────────────────────────────

/// Trait for storing and loading checkpoints and indexed-block markers.
///
/// Implementations include `MemoryCheckpointStore` here, plus
/// `InMemoryStorage` and `SqliteStorage` in `vchainindex-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read one checkpoint field for `namespace`.
    async fn get_field(
        &self,
        namespace: &str,
        field: CheckpointField,
    ) -> Result<Option<String>, IndexerError>;

    /// Store the next block and the last known chain block (absent clears it).
    async fn set_next(
        &self,
        namespace: &str,
        next_block: &NextBlock,
        last_known_chain_block: Option<&BlockHash>,
    ) -> Result<(), IndexerError>;

    /// Delete every field stored under `namespace`.
    async fn clear(&self, namespace: &str) -> Result<(), IndexerError>;

    /// Returns `true` if the block's transactions were already handled.
    async fn is_block_indexed(&self, hash: &BlockHash) -> Result<bool, IndexerError>;

    /// Record that a block's transactions were handled. An existing marker is
    /// left untouched.
    async fn mark_block_indexed(&self, hash: &BlockHash) -> Result<(), IndexerError>;
}

// ─── CheckpointManager ────────────────────────────────────────────────────────

/// What a finished step asks the manager to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointUpdate {
    /// Store the next block and reference.
    Advance {
        next_block: NextBlock,
        last_known_chain_block: Option<BlockHash>,
    },
    /// Drop the checkpoint so the next iteration re-resolves against the tip.
    Clear,
}

impl CheckpointUpdate {
    /// Decide what to persist after processing `resolved`.
    ///
    /// - the candidate is the tip sentinel: the chain had nothing new, store it
    /// - the candidate is a different hash: the chain moved on, store it
    /// - the candidate is `resolved` itself: nothing past this point, clear
    pub fn plan(
        resolved: &BlockHash,
        candidate: NextBlock,
        last_known_chain_block: Option<BlockHash>,
    ) -> Self {
        match candidate {
            NextBlock::Hash(ref next) if next == resolved => Self::Clear,
            next_block => Self::Advance {
                next_block,
                last_known_chain_block,
            },
        }
    }
}

/// Reads and writes the checkpoint of one indexer namespace.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    namespace: String,
}

impl CheckpointManager {
    /// Derive the namespace from the indexer identity.
    ///
    /// The identity must be unique among indexers sharing a store.
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        indexer_id: &str,
    ) -> Result<Self, IndexerError> {
        let id = indexer_id.trim();
        if id.is_empty() {
            return Err(IndexerError::Config("indexer id must not be empty".into()));
        }
        Ok(Self {
            store,
            namespace: format!("vchainindex:{id}"),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Load the saved checkpoint (both fields `None` if none exists).
    pub async fn load(&self) -> Result<Checkpoint, IndexerError> {
        let next = self
            .store
            .get_field(&self.namespace, CheckpointField::NextBlock)
            .await?;
        let reference = self
            .store
            .get_field(&self.namespace, CheckpointField::LastKnownChainBlock)
            .await?;

        Ok(Checkpoint {
            next_block: next.as_deref().and_then(NextBlock::parse),
            last_known_chain_block: reference
                .map(BlockHash::new)
                .filter(|h| !h.is_empty()),
        })
    }

    /// Persist an update produced by [`CheckpointUpdate::plan`].
    pub async fn apply(&self, update: &CheckpointUpdate) -> Result<(), IndexerError> {
        match update {
            CheckpointUpdate::Advance {
                next_block,
                last_known_chain_block,
            } => {
                self.store
                    .set_next(&self.namespace, next_block, last_known_chain_block.as_ref())
                    .await
            }
            CheckpointUpdate::Clear => self.store.clear(&self.namespace).await,
        }
    }

    pub async fn clear(&self) -> Result<(), IndexerError> {
        self.store.clear(&self.namespace).await
    }

    pub async fn is_block_indexed(&self, hash: &BlockHash) -> Result<bool, IndexerError> {
        self.store.is_block_indexed(hash).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    fields: Mutex<HashMap<(String, &'static str), String>>,
    indexed: Mutex<HashSet<BlockHash>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> IndexerError {
    IndexerError::Storage("checkpoint store lock poisoned".into())
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_field(
        &self,
        namespace: &str,
        field: CheckpointField,
    ) -> Result<Option<String>, IndexerError> {
        let fields = self.fields.lock().map_err(poisoned)?;
        Ok(fields.get(&(namespace.to_string(), field.as_str())).cloned())
    }

    async fn set_next(
        &self,
        namespace: &str,
        next_block: &NextBlock,
        last_known_chain_block: Option<&BlockHash>,
    ) -> Result<(), IndexerError> {
        let mut fields = self.fields.lock().map_err(poisoned)?;
        fields.insert(
            (namespace.to_string(), CheckpointField::NextBlock.as_str()),
            next_block.as_stored().to_string(),
        );
        let reference_key = (
            namespace.to_string(),
            CheckpointField::LastKnownChainBlock.as_str(),
        );
        match last_known_chain_block {
            Some(h) => fields.insert(reference_key, h.to_string()),
            None => fields.remove(&reference_key),
        };
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), IndexerError> {
        self.fields
            .lock()
            .map_err(poisoned)?
            .retain(|(ns, _), _| ns != namespace);
        Ok(())
    }

    async fn is_block_indexed(&self, hash: &BlockHash) -> Result<bool, IndexerError> {
        Ok(self.indexed.lock().map_err(poisoned)?.contains(hash))
    }

    async fn mark_block_indexed(&self, hash: &BlockHash) -> Result<(), IndexerError> {
        self.indexed.lock().map_err(poisoned)?.insert(hash.clone());
        Ok(())
    }
}
