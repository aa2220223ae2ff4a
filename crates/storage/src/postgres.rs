//! Postgres-backed storage adapter.
//!
//! Tables are created dynamically from the negotiated schema, so all SQL here
//! is assembled from validated identifiers (see
//! [`driftwatch_core::config::valid_identifier`]) and bound parameters; raw
//! values never reach the query text.
//!
//! ## Error mapping
//!
//! | sqlx error                        | StorageError   |
//! |-----------------------------------|----------------|
//! | Database, code `23505`            | `Duplicate`    |
//! | Database, other                   | `Persistence`  |
//! | Io / PoolTimedOut / PoolClosed    | `Connectivity` |
//! | anything else                     | `Persistence`  |
//!
//! The adapter keeps a registry of schemas it has negotiated (populated by
//! `create_table`) so that reads can decode rows back into typed records.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::instrument;

use driftwatch_core::config::valid_identifier;
use driftwatch_core::observation::ANOMALY_FLAG_COLUMN;
use driftwatch_core::{FieldKind, FieldValue, Observation, ScoredRecord, TableSchema};

use crate::adapter::{StorageAdapter, StorageError};

/// Postgres implementation of the storage contract.
///
/// Thread-safe: the sqlx pool handles connection management, and the schema
/// registry is only touched outside of await points.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    schemas: RwLock<HashMap<String, TableSchema>>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| StorageError::Connectivity(format!("connect: {e}")))?;
        Ok(Self::new(pool))
    }

    fn schema_for(&self, table: &str) -> Result<TableSchema, StorageError> {
        self.schemas
            .read()
            .map_err(|_| StorageError::Persistence("schema registry lock poisoned".to_string()))?
            .get(table)
            .cloned()
            .ok_or_else(|| {
                StorageError::Persistence(format!("no schema negotiated for table '{table}'"))
            })
    }

    fn register_schema(&self, table: &str, schema: &TableSchema) -> Result<(), StorageError> {
        self.schemas
            .write()
            .map_err(|_| StorageError::Persistence("schema registry lock poisoned".to_string()))?
            .insert(table.to_string(), schema.clone());
        Ok(())
    }
}

fn column_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Numeric => "DOUBLE PRECISION",
        FieldKind::Integer => "BIGINT",
        FieldKind::Timestamp => "TIMESTAMPTZ",
        FieldKind::Text => "TEXT",
    }
}

fn validate_schema_identifiers(table: &str, schema: &TableSchema) -> Result<(), StorageError> {
    if !valid_identifier(table) {
        return Err(StorageError::Schema(format!(
            "'{table}' is not a valid table identifier"
        )));
    }
    for (name, _) in schema.fields() {
        if !valid_identifier(name) {
            return Err(StorageError::Schema(format!(
                "'{name}' is not a valid column identifier"
            )));
        }
    }
    Ok(())
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Connectivity(format!("{op}: {e}"))
        }
        _ => StorageError::Persistence(format!("{op}: {e}")),
    }
}

#[async_trait]
impl StorageAdapter for PostgresStore {
    #[instrument(skip(self), err)]
    async fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connectivity(format!("table_exists: {e}")))?;
        Ok(exists)
    }

    #[instrument(skip(self, schema), err)]
    async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), StorageError> {
        if schema.fields().is_empty() {
            return Err(StorageError::Schema("empty field specs".to_string()));
        }
        validate_schema_identifiers(table, schema)?;
        let ts_column = schema.timestamp_column().ok_or_else(|| {
            StorageError::Schema("schema must contain exactly one timestamp column".to_string())
        })?;

        // Register first so reads can decode even when the table pre-exists.
        self.register_schema(table, schema)?;

        if self.table_exists(table).await? {
            return Ok(());
        }

        let mut columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|(name, kind)| {
                if name == ts_column {
                    format!("\"{name}\" {} PRIMARY KEY", column_type(*kind))
                } else {
                    format!("\"{name}\" {}", column_type(*kind))
                }
            })
            .collect();
        columns.push(format!("\"{ANOMALY_FLAG_COLUMN}\" BOOLEAN"));

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" ({})",
            columns.join(", ")
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_table", e))?;

        tracing::info!(table, columns = schema.fields().len() + 1, "created table");
        Ok(())
    }

    #[instrument(skip(self, record), fields(timestamp = %record.timestamp()), err)]
    async fn insert(&self, table: &str, record: &ScoredRecord) -> Result<(), StorageError> {
        let schema = self.schema_for(table)?;

        let names: Vec<String> = schema
            .fields()
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .chain(std::iter::once(format!("\"{ANOMALY_FLAG_COLUMN}\"")))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({})",
            names.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (name, kind) in schema.fields() {
            let value = record.observation.get(name).ok_or_else(|| {
                StorageError::Schema(format!("record is missing column '{name}'"))
            })?;
            query = match (kind, value) {
                (FieldKind::Numeric, v) => {
                    let f = v.as_f64().ok_or_else(|| {
                        StorageError::Schema(format!("column '{name}' is not numeric"))
                    })?;
                    query.bind(f)
                }
                (FieldKind::Integer, FieldValue::Integer(i)) => query.bind(*i),
                (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => query.bind(*ts),
                (FieldKind::Text, FieldValue::Text(s)) => query.bind(s.clone()),
                (kind, value) => {
                    return Err(StorageError::Schema(format!(
                        "column '{name}' expected {kind:?}, got {:?}",
                        value.kind()
                    )));
                }
            };
        }
        query = query.bind(record.is_anomaly);

        query.execute(&self.pool).await.map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.code().as_deref() == Some("23505") {
                    return StorageError::Duplicate(record.timestamp());
                }
            }
            map_sqlx_error("insert", e)
        })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn fetch_latest(
        &self,
        table: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, StorageError> {
        let schema = self.schema_for(table)?;
        let ts_column = schema.timestamp_column().ok_or_else(|| {
            StorageError::Schema("schema must contain exactly one timestamp column".to_string())
        })?;

        let names: Vec<String> = schema
            .fields()
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .chain(std::iter::once(format!("\"{ANOMALY_FLAG_COLUMN}\"")))
            .collect();
        let sql = format!(
            "SELECT {cols} FROM (SELECT {cols} FROM \"{table}\" ORDER BY \"{ts_column}\" DESC LIMIT $1) latest ORDER BY \"{ts_column}\" ASC",
            cols = names.join(", ")
        );

        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_latest", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = BTreeMap::new();
            for (name, kind) in schema.fields() {
                let value = match kind {
                    FieldKind::Numeric => FieldValue::Float(
                        row.try_get::<f64, _>(name.as_str())
                            .map_err(|e| decode_error(name, e))?,
                    ),
                    FieldKind::Integer => FieldValue::Integer(
                        row.try_get::<i64, _>(name.as_str())
                            .map_err(|e| decode_error(name, e))?,
                    ),
                    FieldKind::Timestamp => FieldValue::Timestamp(
                        row.try_get::<DateTime<Utc>, _>(name.as_str())
                            .map_err(|e| decode_error(name, e))?,
                    ),
                    FieldKind::Text => FieldValue::Text(
                        row.try_get::<String, _>(name.as_str())
                            .map_err(|e| decode_error(name, e))?,
                    ),
                };
                values.insert(name.clone(), value);
            }
            let timestamp = match values.get(ts_column) {
                Some(FieldValue::Timestamp(ts)) => *ts,
                _ => {
                    return Err(StorageError::Persistence(format!(
                        "row in '{table}' has no timestamp in '{ts_column}'"
                    )));
                }
            };
            let is_anomaly: Option<bool> = row
                .try_get(ANOMALY_FLAG_COLUMN)
                .map_err(|e| decode_error(ANOMALY_FLAG_COLUMN, e))?;

            records.push(ScoredRecord::new(
                Observation::from_parts(timestamp, values),
                is_anomaly,
            ));
        }
        Ok(records)
    }

    #[instrument(skip(self), err)]
    async fn update_flag(
        &self,
        table: &str,
        timestamp: DateTime<Utc>,
        flag: bool,
    ) -> Result<(), StorageError> {
        let schema = self.schema_for(table)?;
        let ts_column = schema.timestamp_column().ok_or_else(|| {
            StorageError::Schema("schema must contain exactly one timestamp column".to_string())
        })?;

        let sql = format!(
            "UPDATE \"{table}\" SET \"{ANOMALY_FLAG_COLUMN}\" = $1 WHERE \"{ts_column}\" = $2"
        );
        let result = sqlx::query(&sql)
            .bind(flag)
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_flag", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                table: table.to_string(),
                timestamp,
            });
        }
        Ok(())
    }
}

fn decode_error(column: &str, e: sqlx::Error) -> StorageError {
    StorageError::Persistence(format!("failed to decode column '{column}': {e}"))
}
