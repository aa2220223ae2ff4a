//! In-memory storage adapter.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use driftwatch_core::config::valid_identifier;
use driftwatch_core::{ScoredRecord, TableSchema};

use crate::adapter::{StorageAdapter, StorageError};

#[derive(Debug)]
struct TableState {
    schema: TableSchema,
    // BTreeMap keeps rows in ascending timestamp order for free.
    rows: BTreeMap<DateTime<Utc>, ScoredRecord>,
}

/// In-memory table store keyed by timestamp.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, TableState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count for assertions in tests.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map(|s| s.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

fn poisoned() -> StorageError {
    StorageError::Persistence("lock poisoned".to_string())
}

#[async_trait]
impl StorageAdapter for InMemoryStore {
    async fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.contains_key(table))
    }

    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), StorageError> {
        if !valid_identifier(table) {
            return Err(StorageError::Schema(format!(
                "'{table}' is not a valid table identifier"
            )));
        }
        if schema.fields().is_empty() {
            return Err(StorageError::Schema("empty field specs".to_string()));
        }

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if let Some(existing) = tables.get(table) {
            if existing.schema != *schema {
                return Err(StorageError::Schema(format!(
                    "table '{table}' already exists with a different schema"
                )));
            }
            return Ok(());
        }

        tables.insert(
            table.to_string(),
            TableState {
                schema: schema.clone(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn insert(&self, table: &str, record: &ScoredRecord) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let state = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::Persistence(format!("table '{table}' does not exist")))?;

        let ts = record.timestamp();
        if state.rows.contains_key(&ts) {
            return Err(StorageError::Duplicate(ts));
        }
        state.rows.insert(ts, record.clone());
        Ok(())
    }

    async fn fetch_latest(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, StorageError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let state = tables
            .get(table)
            .ok_or_else(|| StorageError::Persistence(format!("table '{table}' does not exist")))?;

        let mut latest: Vec<ScoredRecord> =
            state.rows.values().rev().take(limit).cloned().collect();
        latest.reverse();
        Ok(latest)
    }

    async fn update_flag(
        &self,
        table: &str,
        timestamp: DateTime<Utc>,
        flag: bool,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let state = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::Persistence(format!("table '{table}' does not exist")))?;

        match state.rows.get_mut(&timestamp) {
            Some(row) => {
                row.is_anomaly = Some(flag);
                Ok(())
            }
            None => Err(StorageError::NotFound {
                table: table.to_string(),
                timestamp,
            }),
        }
    }
}
