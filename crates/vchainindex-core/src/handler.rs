//! Transaction handler trait + registry.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::IndexerError;
use crate::types::{AcceptedTransaction, BlockBatch, BlockHash};

/// What one resolved step hands to the handlers.
#[derive(Debug, Clone, Copy)]
pub struct IndexedStep<'a> {
    /// The block the step started from, with the tip sentinel resolved.
    pub from: &'a BlockHash,
    /// Accepted transactions, in block order, each id once.
    pub transactions: &'a [AcceptedTransaction],
    /// The fetched blocks minus those removed from the virtual chain.
    pub blocks: &'a BlockBatch,
    /// The last chain block the delta reported, if it accepted anything.
    pub last_chain_block: Option<&'a BlockHash>,
}

/// Trait for user-provided handlers of accepted transactions.
///
/// Delivery is at-least-once: after a crash between the handler call and the
/// checkpoint write the same batch is delivered again, so implementations
/// must tolerate seeing a transaction twice.
///
/// A handler that also backs the checkpoint store can call
/// [`CheckpointStore::mark_block_indexed`](crate::checkpoint::CheckpointStore::mark_block_indexed)
/// on `step.from` from [`on_step`](TransactionHandler::on_step). A later step
/// from that block then skips the handlers.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// Called once per resolved step, possibly with an empty batch.
    async fn on_accepted_transactions(
        &self,
        batch: &[AcceptedTransaction],
    ) -> Result<(), IndexerError>;

    /// Called by the registry with the whole step. Defaults to
    /// [`on_accepted_transactions`](TransactionHandler::on_accepted_transactions).
    async fn on_step(&self, step: &IndexedStep<'_>) -> Result<(), IndexerError> {
        self.on_accepted_transactions(step.transactions).await
    }

    /// Name used in logs and handler errors.
    fn name(&self) -> &str {
        "transactions"
    }
}

/// Registry of transaction handlers, called in registration order.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn TransactionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: vec![] }
    }

    /// Register a handler.
    pub fn on_transactions(&mut self, handler: Arc<dyn TransactionHandler>) {
        self.handlers.push(handler);
    }

    /// Builder-style variant of [`HandlerRegistry::on_transactions`].
    pub fn with(mut self, handler: Arc<dyn TransactionHandler>) -> Self {
        self.on_transactions(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a step to every handler, stopping at the first failure.
    ///
    /// Failures come back as [`IndexerError::Handler`] naming the handler.
    pub async fn dispatch(&self, step: &IndexedStep<'_>) -> Result<(), IndexerError> {
        for handler in &self.handlers {
            handler
                .on_step(step)
                .await
                .map_err(|e| match e {
                    e @ IndexerError::Handler { .. } => e,
                    other => IndexerError::handler(handler.name(), other.to_string()),
                })?;
        }
        Ok(())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every accepted transaction at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl TransactionHandler for LoggingHandler {
    async fn on_accepted_transactions(
        &self,
        batch: &[AcceptedTransaction],
    ) -> Result<(), IndexerError> {
        for accepted in batch {
            tracing::info!(
                tx = %accepted.id().map(|id| id.as_str()).unwrap_or_default(),
                accepting_block = %accepted.accepting_block_hash,
                outputs = accepted.transaction.outputs.len(),
                "accepted transaction"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
