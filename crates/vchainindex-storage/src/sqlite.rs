//! SQLite storage backend for vchainindex.
//!
//! Persists checkpoint fields, indexed-block markers and accepted
//! transactions to a single SQLite file. Uses `sqlx` with WAL mode for
//! concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use vchainindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./vchainindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use vchainindex_core::checkpoint::{CheckpointField, CheckpointStore, NextBlock};
use vchainindex_core::error::IndexerError;
use vchainindex_core::handler::{IndexedStep, TransactionHandler};
use vchainindex_core::types::{AcceptedTransaction, BlockHash, Transaction, TransactionId};

use crate::memory::StoredTransaction;

fn storage_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// SQLite-backed storage for checkpoints, block markers and transactions.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./vchainindex.db"`) or a full
    /// SQLite URL (`"sqlite:./vchainindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // Each connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoint_fields (
                namespace   TEXT    NOT NULL,
                field       TEXT    NOT NULL,
                value       TEXT    NOT NULL,
                updated_at  INTEGER NOT NULL,
                PRIMARY KEY (namespace, field)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indexed_blocks (
                block_hash  TEXT    PRIMARY KEY,
                indexed_at  INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accepted_transactions (
                transaction_id        TEXT    PRIMARY KEY,
                accepting_block_hash  TEXT    NOT NULL,
                payload               TEXT    NOT NULL,
                indexed_at            INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_accepted_block
             ON accepted_transactions (accepting_block_hash);",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    // ─── Transaction queries ─────────────────────────────────────────────────────

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredTransaction, IndexerError> {
        let payload: String = row.get("payload");
        let transaction: Transaction = serde_json::from_str(&payload).map_err(storage_err)?;
        Ok(StoredTransaction {
            transaction: AcceptedTransaction {
                transaction,
                accepting_block_hash: BlockHash::new(row.get::<String, _>("accepting_block_hash")),
            },
            indexed_at: timestamp(row.get("indexed_at")),
        })
    }

    /// Look up a stored transaction by id.
    pub async fn transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<StoredTransaction>, IndexerError> {
        let row = sqlx::query(
            "SELECT accepting_block_hash, payload, indexed_at
             FROM accepted_transactions WHERE transaction_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    /// Transactions accepted by the given chain block, in insertion order.
    pub async fn transactions_by_block(
        &self,
        accepting_block: &BlockHash,
    ) -> Result<Vec<StoredTransaction>, IndexerError> {
        let rows = sqlx::query(
            "SELECT accepting_block_hash, payload, indexed_at
             FROM accepted_transactions WHERE accepting_block_hash = ? ORDER BY rowid",
        )
        .bind(accepting_block.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(Self::decode_row).collect()
    }

    /// Total number of stored transactions.
    pub async fn transaction_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM accepted_transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// When the namespace's checkpoint was last written.
    pub async fn checkpoint_updated_at(
        &self,
        namespace: &str,
    ) -> Result<Option<DateTime<Utc>>, IndexerError> {
        let row = sqlx::query(
            "SELECT MAX(updated_at) as updated_at FROM checkpoint_fields WHERE namespace = ?",
        )
        .bind(namespace)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.get::<Option<i64>, _>("updated_at").map(timestamp))
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn get_field(
        &self,
        namespace: &str,
        field: CheckpointField,
    ) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query(
            "SELECT value FROM checkpoint_fields WHERE namespace = ? AND field = ?",
        )
        .bind(namespace)
        .bind(field.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    /// Both fields are written in one database transaction.
    async fn set_next(
        &self,
        namespace: &str,
        next_block: &NextBlock,
        last_known_chain_block: Option<&BlockHash>,
    ) -> Result<(), IndexerError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoint_fields (namespace, field, value, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(namespace)
        .bind(CheckpointField::NextBlock.as_str())
        .bind(next_block.as_stored())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        match last_known_chain_block {
            Some(hash) => {
                sqlx::query(
                    "INSERT OR REPLACE INTO checkpoint_fields (namespace, field, value, updated_at)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(namespace)
                .bind(CheckpointField::LastKnownChainBlock.as_str())
                .bind(hash.as_str())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }
            None => {
                sqlx::query("DELETE FROM checkpoint_fields WHERE namespace = ? AND field = ?")
                    .bind(namespace)
                    .bind(CheckpointField::LastKnownChainBlock.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_err)?;
            }
        }

        tx.commit().await.map_err(storage_err)?;

        debug!(
            namespace,
            next = %next_block,
            reference = ?last_known_chain_block,
            "checkpoint saved"
        );
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<(), IndexerError> {
        sqlx::query("DELETE FROM checkpoint_fields WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        debug!(namespace, "checkpoint cleared");
        Ok(())
    }

    async fn is_block_indexed(&self, hash: &BlockHash) -> Result<bool, IndexerError> {
        let row = sqlx::query("SELECT 1 FROM indexed_blocks WHERE block_hash = ?")
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.is_some())
    }

    async fn mark_block_indexed(&self, hash: &BlockHash) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR IGNORE INTO indexed_blocks (block_hash, indexed_at) VALUES (?, ?)")
            .bind(hash.as_str())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

// ─── TransactionHandler impl ─────────────────────────────────────────────────

/// Insert a batch, skipping ids already stored. Returns the number inserted.
async fn insert_batch(
    conn: &mut SqliteConnection,
    batch: &[AcceptedTransaction],
    now: i64,
) -> Result<u64, IndexerError> {
    let mut inserted = 0u64;
    for accepted in batch {
        let Some(id) = accepted.id() else { continue };
        let payload = serde_json::to_string(&accepted.transaction).map_err(storage_err)?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO accepted_transactions
             (transaction_id, accepting_block_hash, payload, indexed_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(accepted.accepting_block_hash.as_str())
        .bind(&payload)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

#[async_trait]
impl TransactionHandler for SqliteStorage {
    /// Insert the batch in one database transaction. Ids already stored are
    /// skipped, so replays after a crash are harmless.
    async fn on_accepted_transactions(
        &self,
        batch: &[AcceptedTransaction],
    ) -> Result<(), IndexerError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let inserted = insert_batch(&mut *tx, batch, now).await?;
        tx.commit().await.map_err(storage_err)?;

        debug!(batch = batch.len(), inserted, "accepted transactions stored");
        Ok(())
    }

    /// Store the step's transactions and mark its start block in the same
    /// database transaction.
    async fn on_step(&self, step: &IndexedStep<'_>) -> Result<(), IndexerError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let inserted = insert_batch(&mut *tx, step.transactions, now).await?;
        sqlx::query("INSERT OR IGNORE INTO indexed_blocks (block_hash, indexed_at) VALUES (?, ?)")
            .bind(step.from.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        debug!(from = %step.from, inserted, "step stored");
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite-storage"
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
