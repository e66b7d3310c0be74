//! vchainindex-storage — storage backends for the vchainindex engine.
//!
//! Each backend is both a `CheckpointStore` (resume cursor and block
//! markers) and a `TransactionHandler` that keeps accepted transactions.
//!
//! - [`memory::InMemoryStorage`] — always available
//! - [`sqlite::SqliteStorage`] — behind the `sqlite` feature

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{InMemoryStorage, StoredTransaction};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
