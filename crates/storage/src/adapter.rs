//! Storage adapter contract.
//!
//! A thin, engine-agnostic contract over a relational store: existence check,
//! idempotent table creation, all-or-nothing row insert, bounded ordered
//! fetch, and a point flag update. Retry policy and connection pooling are
//! implementation decisions, not part of the contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use driftwatch_core::{ScoredRecord, TableSchema};

/// Storage operation error.
///
/// These are infrastructure errors (schema, durability, connectivity) as
/// opposed to domain errors (validation, data quality).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Invalid or unusable schema/identifier (empty field specs, unsafe
    /// table name, schema conflict on re-create).
    #[error("schema error: {0}")]
    Schema(String),

    /// The write or read could not be completed (constraint violation other
    /// than duplicate key, engine failure, timeout).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A row with this timestamp already exists (at-most-one-write guard).
    #[error("row with timestamp {0} already exists")]
    Duplicate(DateTime<Utc>),

    /// No row matched a point update.
    #[error("no row in '{table}' with timestamp {timestamp}")]
    NotFound {
        table: String,
        timestamp: DateTime<Utc>,
    },

    /// The store itself is unreachable.
    #[error("storage connectivity failure: {0}")]
    Connectivity(String),
}

/// Contract over a relational store, one table per stream.
///
/// `fetch_latest` returning fewer rows than requested is **not** an error at
/// this layer; it signals insufficient history and the caller decides what
/// that means.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Whether `table` exists. Errors only on connectivity failure, never on
    /// absence.
    async fn table_exists(&self, table: &str) -> Result<bool, StorageError>;

    /// Create `table` from `schema`, appending the anomaly-flag column.
    /// Idempotent via a preceding existence check; an empty schema is a
    /// [`StorageError::Schema`].
    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), StorageError>;

    /// Append one row, all-or-nothing. A duplicate timestamp is
    /// [`StorageError::Duplicate`].
    async fn insert(&self, table: &str, record: &ScoredRecord) -> Result<(), StorageError>;

    /// Up to `limit` most recent rows, ordered ascending by timestamp.
    async fn fetch_latest(&self, table: &str, limit: usize)
    -> Result<Vec<ScoredRecord>, StorageError>;

    /// Point update of the anomaly flag for the row keyed by `timestamp`.
    async fn update_flag(
        &self,
        table: &str,
        timestamp: DateTime<Utc>,
        flag: bool,
    ) -> Result<(), StorageError>;
}
