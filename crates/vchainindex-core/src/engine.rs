//! The indexing engine — bootstrap, then the checkpointed steady loop.
//!
//! # Bootstrap
//! Connect to the node, then run one step from the configured start block
//! (or the pruning point) with no chain reference.
//!
//! # Steady loop
//! Each iteration reads the checkpoint:
//!   - next block hash stored: run a step from it with the stored reference
//!   - tip sentinel stored: sleep `poll_interval_ms`, then run a step from the
//!     tip with the stored reference
//!   - nothing stored: sleep `poll_interval_ms`, then run a step from the tip
//!
//! # Step
//! resolve start → fetch blocks → skip if already indexed → fetch the
//! virtual-chain delta → resolve → handlers → persist the checkpoint.
//! Handlers always finish before the checkpoint moves, so a crash in between
//! replays the step (at-least-once).
//!
//! Bootstrap and every loop iteration are retried `retry` times. Cancellation
//! is observed between iterations and during the poll sleep, never mid-step.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::checkpoint::{CheckpointManager, CheckpointStore, CheckpointUpdate, NextBlock};
use crate::error::IndexerError;
use crate::handler::{HandlerRegistry, IndexedStep};
use crate::indexer::{IndexerConfig, IndexerState};
use crate::resolver::VirtualChainResolver;
use crate::retry::with_retries;
use crate::source::ChainSource;
use crate::types::BlockHash;

/// How one loop iteration ended.
enum Iteration {
    Indexed(CheckpointUpdate),
    Cancelled,
}

/// Drives a [`ChainSource`] through the resolver into the handlers.
pub struct IndexingEngine<S: ChainSource> {
    config: IndexerConfig,
    source: S,
    checkpoint: CheckpointManager,
    handlers: HandlerRegistry,
    state: IndexerState,
}

impl<S: ChainSource> IndexingEngine<S> {
    /// Build an engine. The checkpoint namespace is derived from `config.id`.
    pub fn new(
        config: IndexerConfig,
        source: S,
        store: Arc<dyn CheckpointStore>,
        handlers: HandlerRegistry,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let checkpoint = CheckpointManager::new(store, &config.id)?;
        Ok(Self {
            config,
            source,
            checkpoint,
            handlers,
            state: IndexerState::Uninitialized,
        })
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Start, then run the steady loop until `cancel` fires or retries run out.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), IndexerError> {
        self.start().await?;
        self.run_loop(cancel).await
    }

    /// Connect and run the bootstrap step.
    ///
    /// A connection failure is returned as-is; the bootstrap step is retried.
    pub async fn start(&mut self) -> Result<(), IndexerError> {
        info!(
            indexer = %self.config.id,
            namespace = %self.checkpoint.namespace(),
            "Starting indexer"
        );
        self.state = IndexerState::Bootstrapping;

        if let Err(e) = self.source.connect().await {
            error!(error = %e, "error connecting to chain node");
            self.state = IndexerState::Failed;
            return Err(e);
        }
        info!("chain node connected");

        let from = NextBlock::from(self.config.from_block.clone());
        let result = with_retries(self.config.retry, "bootstrap", || {
            self.index_step(&from, None)
        })
        .await;

        match result {
            Ok(update) => {
                debug!(?update, "bootstrap step complete");
                self.state = IndexerState::Live;
                Ok(())
            }
            Err(e) => {
                self.state = IndexerState::Failed;
                Err(e)
            }
        }
    }

    /// The steady loop. Returns `Ok(())` only when cancelled.
    pub async fn run_loop(&mut self, cancel: CancellationToken) -> Result<(), IndexerError> {
        self.state = IndexerState::Live;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let outcome = with_retries(self.config.retry, "index next", || {
                self.iteration(&cancel)
            })
            .await;

            match outcome {
                Ok(Iteration::Indexed(update)) => debug!(?update, "iteration complete"),
                Ok(Iteration::Cancelled) => break,
                Err(e) => {
                    self.state = IndexerState::Failed;
                    return Err(e);
                }
            }
        }

        info!(indexer = %self.config.id, "indexer stopped");
        self.state = IndexerState::Stopped;
        Ok(())
    }

    async fn iteration(&self, cancel: &CancellationToken) -> Result<Iteration, IndexerError> {
        let checkpoint = self.checkpoint.load().await?;
        info!(
            next = ?checkpoint.next_block,
            reference = ?checkpoint.last_known_chain_block,
            "loaded checkpoint"
        );

        let update = match checkpoint.next_block {
            Some(next @ NextBlock::Hash(_)) => {
                self.index_step(&next, checkpoint.last_known_chain_block.as_ref())
                    .await?
            }
            pending => {
                // A stored sentinel keeps its reference; a cleared cursor starts over.
                let reference = match pending {
                    Some(NextBlock::Tip) => {
                        debug!("chain had no new blocks, polling the tip");
                        checkpoint.last_known_chain_block
                    }
                    _ => {
                        info!("no next block to index, polling the tip");
                        None
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(Iteration::Cancelled),
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
                self.index_step(&NextBlock::Tip, reference.as_ref()).await?
            }
        };
        Ok(Iteration::Indexed(update))
    }

    /// Run one step from `from` and persist the resulting checkpoint.
    ///
    /// Returns what was persisted.
    pub async fn index_step(
        &self,
        from: &NextBlock,
        reference: Option<&BlockHash>,
    ) -> Result<CheckpointUpdate, IndexerError> {
        let resolved = match from {
            NextBlock::Tip => self.source.resolve_tip_or_pruning_point().await?,
            NextBlock::Hash(hash) => hash.clone(),
        };
        info!(from = %resolved, "fetching blocks");

        let batch = self.source.fetch_blocks(&resolved).await?;
        if let Some(last) = batch.last_block() {
            info!(
                blocks = batch.len(),
                last_timestamp = last.header.timestamp,
                "fetched blocks"
            );
        }
        let candidate = NextBlock::from(batch.last_hash().cloned());

        if self.checkpoint.is_block_indexed(&resolved).await? {
            info!(block = %resolved, "block already indexed");
            let update = CheckpointUpdate::plan(&resolved, candidate, reference.cloned());
            self.checkpoint.apply(&update).await?;
            return Ok(update);
        }

        let since = reference.unwrap_or(&resolved);
        debug!(since = %since, "fetching virtual chain");
        let delta = self.source.fetch_virtual_chain_delta(since).await?;
        let resolution = VirtualChainResolver::resolve(batch, &delta);

        self.handlers
            .dispatch(&IndexedStep {
                from: &resolved,
                transactions: &resolution.valid_transactions,
                blocks: &resolution.pruned_batch,
                last_chain_block: resolution.next_reference.as_ref(),
            })
            .await?;

        // An empty delta leaves the chain where it was: keep the old reference.
        let next_reference = resolution.next_reference.or_else(|| reference.cloned());
        let update = CheckpointUpdate::plan(&resolved, candidate, next_reference);
        self.checkpoint.apply(&update).await?;

        info!(
            accepted = resolution.valid_transactions.len(),
            checkpoint = ?update,
            "step complete"
        );
        Ok(update)
    }
}
