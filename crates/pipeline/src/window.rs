//! Window manager.
//!
//! Builds the N×F feature matrix the oracle consumes from the N most recent
//! persisted rows. A window is only valid when it holds exactly N rows with
//! strictly increasing timestamps and every feature coerces to a number;
//! anything else is surfaced, never silently repaired.

use chrono::{DateTime, Utc};
use thiserror::Error;

use driftwatch_core::{FeatureMatrix, ScoredRecord, TableSchema};
use driftwatch_storage::{StorageAdapter, StorageError};

#[derive(Debug, Error)]
pub enum WindowError {
    /// Fewer than N rows exist yet. A legitimate early-stream condition:
    /// callers skip scoring, they do not treat this as a bug.
    #[error("insufficient history: have {have} rows, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// A field could not be coerced to a numeric feature.
    #[error("data quality: field '{field}' in row {row} is not numeric: {detail}")]
    DataQuality {
        field: String,
        row: DateTime<Utc>,
        detail: String,
    },

    /// Fetched rows are not strictly increasing in timestamp. The pipeline
    /// never scores against a window with ambiguous chronology.
    #[error("ordering violation: {0}")]
    OrderingViolation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fetch the latest `n` rows of `table` and assemble the feature matrix.
///
/// Feature columns are the schema's columns minus the timestamp (row index)
/// and the anomaly flag (verdict, never an input), in stable schema order.
pub async fn build_window(
    adapter: &dyn StorageAdapter,
    table: &str,
    schema: &TableSchema,
    timestamp_field: &str,
    n: usize,
) -> Result<FeatureMatrix, WindowError> {
    let rows = adapter.fetch_latest(table, n).await?;

    if rows.len() < n {
        return Err(WindowError::InsufficientHistory {
            have: rows.len(),
            need: n,
        });
    }

    verify_strictly_increasing(&rows)?;

    let columns = schema.feature_columns(timestamp_field);
    let mut matrix = FeatureMatrix::new(columns.clone());
    for row in &rows {
        let ts = row.timestamp();
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            let field = row.observation.get(column).ok_or_else(|| {
                WindowError::DataQuality {
                    field: column.clone(),
                    row: ts,
                    detail: "field absent from persisted row".to_string(),
                }
            })?;
            let value = field.as_f64().ok_or_else(|| WindowError::DataQuality {
                field: column.clone(),
                row: ts,
                detail: format!("{field:?}"),
            })?;
            values.push(value);
        }
        matrix
            .push_row(values)
            .map_err(|e| WindowError::DataQuality {
                field: "window".to_string(),
                row: ts,
                detail: e.to_string(),
            })?;
    }

    Ok(matrix)
}

/// The adapter contract already guarantees ascending order; this is the
/// defensive re-check. Duplicates and out-of-order rows both make the
/// window's chronology ambiguous and abort scoring.
fn verify_strictly_increasing(rows: &[ScoredRecord]) -> Result<(), WindowError> {
    for pair in rows.windows(2) {
        let (a, b) = (pair[0].timestamp(), pair[1].timestamp());
        if a == b {
            return Err(WindowError::OrderingViolation(format!(
                "duplicate timestamp {a} in window"
            )));
        }
        if a > b {
            return Err(WindowError::OrderingViolation(format!(
                "rows out of order: {a} precedes {b}"
            )));
        }
    }
    Ok(())
}
