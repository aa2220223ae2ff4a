//! Pipeline coordinator: the stateful orchestrator behind the service
//! boundary.
//!
//! For each incoming record: validate, fetch the window, infer, score,
//! persist, respond. Terminal states are `Persisted` ([`SubmitOutcome`]) or
//! `Rejected` ([`PipelineError`]); every rejection names its failure kind so
//! the caller can decide whether to retry.
//!
//! The read-window → infer → score → insert section runs under the table's
//! writer lock: the "N most recent rows" read is only meaningful if no
//! concurrent writer can race ahead of it. The coordinator owns exactly one
//! table, processes one record at a time, and never batches or reorders.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;

use driftwatch_core::{
    DomainError, Observation, PipelineConfig, ScoredRecord, TableSchema, TargetTransform,
    is_anomalous,
};
use driftwatch_storage::{StorageAdapter, StorageError};

use crate::oracle::{Oracle, OracleError};
use crate::window::{WindowError, build_window};

/// Rejection taxonomy returned to the immediate caller.
///
/// `Validation`, `DataQuality` and `OrderingViolation` are client/data
/// faults and nothing was persisted. `Oracle` and `Persistence` are
/// infrastructure faults and retry-safe: the identical record can be
/// resubmitted because the timestamp is the primary key. `Conflict` means
/// the row already exists (the retry already succeeded).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("data quality: {0}")]
    DataQuality(String),

    #[error("ordering violation: {0}")]
    OrderingViolation(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("record with timestamp {0} already persisted")]
    Conflict(DateTime<Utc>),
}

impl PipelineError {
    /// Stable failure kind for structured responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::DataQuality(_) => "data_quality_error",
            PipelineError::OrderingViolation(_) => "ordering_violation",
            PipelineError::Oracle(_) => "oracle_error",
            PipelineError::Persistence(_) => "persistence_error",
            PipelineError::Conflict(_) => "conflict",
        }
    }

    /// Whether resubmitting the identical record can succeed.
    pub fn retry_safe(&self) -> bool {
        matches!(
            self,
            PipelineError::Oracle(_) | PipelineError::Persistence(_)
        )
    }
}

/// Terminal `Persisted` state of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Window was available; the record was scored and persisted.
    Scored {
        timestamp: DateTime<Utc>,
        /// Prediction in raw (descaled) units.
        prediction: f64,
        is_anomaly: bool,
    },
    /// Cold start: fewer than N historical rows, persisted with unset flag.
    Unscored { timestamp: DateTime<Utc> },
}

pub struct PipelineCoordinator {
    storage: Arc<dyn StorageAdapter>,
    oracle: Arc<dyn Oracle>,
    transform: Arc<dyn TargetTransform>,
    config: PipelineConfig,
    /// One logical writer per table. The coordinator owns exactly one table,
    /// so one lock suffices.
    write_lock: Mutex<()>,
    /// Negotiated once from the first observation, immutable thereafter.
    schema: RwLock<Option<TableSchema>>,
}

impl PipelineCoordinator {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        oracle: Arc<dyn Oracle>,
        transform: Arc<dyn TargetTransform>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            storage,
            oracle,
            transform,
            config,
            write_lock: Mutex::new(()),
            schema: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one record end to end.
    ///
    /// At most one scoring decision and at most one persisted row per
    /// timestamp; the call runs to completion once started.
    pub async fn submit(&self, body: &JsonValue) -> Result<SubmitOutcome, PipelineError> {
        // Receive: parse and check required fields before taking the lock.
        let observation = Observation::from_json(body, &self.config.timestamp_field)
            .map_err(map_domain)?;
        let actual = observation
            .target_value(&self.config.target_field)
            .map_err(map_domain)?;
        let ts = observation.timestamp();

        let _writer = self.write_lock.lock().await;

        let schema = self.negotiate_schema(&observation).await?;

        // Window.
        let window = match self.bounded_window(&schema).await {
            Ok(window) => window,
            Err(WindowError::InsufficientHistory { have, need }) => {
                // Cold start: persist unscored, never fabricate a verdict.
                tracing::info!(timestamp = %ts, have, need, "cold start, persisting unscored");
                self.bounded_insert(ScoredRecord::new(observation, None))
                    .await?;
                return Ok(SubmitOutcome::Unscored { timestamp: ts });
            }
            Err(e @ WindowError::DataQuality { .. }) => {
                return Err(PipelineError::DataQuality(e.to_string()));
            }
            Err(WindowError::OrderingViolation(msg)) => {
                return Err(PipelineError::OrderingViolation(msg));
            }
            Err(WindowError::Storage(e)) => return Err(map_storage(e)),
        };

        // Infer: exactly one oracle call per scoring decision.
        let normalized = timeout(self.config.oracle_timeout, self.oracle.predict(&window))
            .await
            .map_err(|_| OracleError::Timeout(self.config.oracle_timeout))??;

        // Score in raw units: the oracle predicts in normalized space, the
        // realized target value is raw, so descale the prediction.
        let prediction = self.transform.descale(normalized);
        let anomalous = is_anomalous(actual, prediction, self.config.threshold);

        // Persist.
        self.bounded_insert(ScoredRecord::new(observation, Some(anomalous)))
            .await?;

        tracing::info!(
            timestamp = %ts,
            actual,
            prediction,
            is_anomaly = anomalous,
            "record scored and persisted"
        );

        Ok(SubmitOutcome::Scored {
            timestamp: ts,
            prediction,
            is_anomaly: anomalous,
        })
    }

    /// First observation fixes the table schema; later ones must conform.
    async fn negotiate_schema(
        &self,
        observation: &Observation,
    ) -> Result<TableSchema, PipelineError> {
        let negotiated = self
            .schema
            .read()
            .map_err(|_| PipelineError::Persistence("schema lock poisoned".to_string()))?
            .clone();

        match negotiated {
            Some(schema) => {
                schema.validate(observation).map_err(map_domain)?;
                Ok(schema)
            }
            None => {
                let schema = TableSchema::infer(observation).map_err(map_domain)?;
                timeout(
                    self.config.storage_timeout,
                    self.storage.create_table(&self.config.table_name, &schema),
                )
                .await
                .map_err(|_| storage_timeout(self.config.storage_timeout))?
                .map_err(map_storage)?;

                tracing::info!(
                    table = %self.config.table_name,
                    fields = schema.fields().len(),
                    "negotiated table schema from first observation"
                );
                *self
                    .schema
                    .write()
                    .map_err(|_| PipelineError::Persistence("schema lock poisoned".to_string()))? =
                    Some(schema.clone());
                Ok(schema)
            }
        }
    }

    async fn bounded_window(
        &self,
        schema: &TableSchema,
    ) -> Result<driftwatch_core::FeatureMatrix, WindowError> {
        timeout(
            self.config.storage_timeout,
            build_window(
                self.storage.as_ref(),
                &self.config.table_name,
                schema,
                &self.config.timestamp_field,
                self.config.sequence_length,
            ),
        )
        .await
        .map_err(|_| {
            WindowError::Storage(StorageError::Persistence(format!(
                "window fetch timed out after {:?}",
                self.config.storage_timeout
            )))
        })?
    }

    async fn bounded_insert(&self, record: ScoredRecord) -> Result<(), PipelineError> {
        timeout(
            self.config.storage_timeout,
            self.storage.insert(&self.config.table_name, &record),
        )
        .await
        .map_err(|_| storage_timeout(self.config.storage_timeout))?
        .map_err(map_storage)
    }
}

fn storage_timeout(limit: std::time::Duration) -> PipelineError {
    PipelineError::Persistence(format!("storage round-trip timed out after {limit:?}"))
}

fn map_domain(e: DomainError) -> PipelineError {
    match e {
        DomainError::Validation(msg) => PipelineError::Validation(msg),
        DomainError::NonNumericField { .. } | DomainError::SchemaMismatch(_) => {
            PipelineError::DataQuality(e.to_string())
        }
    }
}

fn map_storage(e: StorageError) -> PipelineError {
    match e {
        StorageError::Duplicate(ts) => PipelineError::Conflict(ts),
        other => PipelineError::Persistence(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use driftwatch_core::{FeatureMatrix, IdentityTransform};
    use driftwatch_storage::InMemoryStore;

    /// Oracle stub: fixed prediction, optionally failing on one call.
    struct StubOracle {
        prediction: f64,
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
    }

    impl StubOracle {
        fn returning(prediction: f64) -> Self {
            Self {
                prediction,
                fail_on_call: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(prediction: f64, call: usize) -> Self {
            Self {
                prediction,
                fail_on_call: Some(call),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Oracle for StubOracle {
        async fn predict(&self, _window: &FeatureMatrix) -> Result<f64, OracleError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_call == Some(call) {
                return Err(OracleError::Unavailable("model server down".to_string()));
            }
            Ok(self.prediction)
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl Oracle for SlowOracle {
        async fn predict(&self, _window: &FeatureMatrix) -> Result<f64, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0.0)
        }
    }

    fn config(n: usize) -> PipelineConfig {
        PipelineConfig {
            sequence_length: n,
            threshold: 0.5,
            table_name: "obs".to_string(),
            target_field: "high".to_string(),
            timestamp_field: "date".to_string(),
            oracle_timeout: Duration::from_millis(200),
            ..PipelineConfig::default()
        }
    }

    fn coordinator_with(
        store: Arc<InMemoryStore>,
        oracle: Arc<dyn Oracle>,
        n: usize,
    ) -> PipelineCoordinator {
        PipelineCoordinator::new(store, oracle, Arc::new(IdentityTransform), config(n))
    }

    fn body(hour: u32, high: f64) -> JsonValue {
        json!({
            "date": format!("2021-03-01T{hour:02}:00:00Z"),
            "high": high,
            "volume": 100,
        })
    }

    #[tokio::test]
    async fn cold_start_persists_unscored() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(StubOracle::returning(10.0)), 3);

        let outcome = c.submit(&body(0, 10.0)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Unscored { .. }));

        let rows = store.fetch_latest("obs", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].is_anomaly, None);
    }

    #[tokio::test]
    async fn scoring_begins_once_window_fills() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(StubOracle::returning(10.0)), 2);

        assert!(matches!(
            c.submit(&body(0, 10.0)).await.unwrap(),
            SubmitOutcome::Unscored { .. }
        ));
        assert!(matches!(
            c.submit(&body(1, 10.2)).await.unwrap(),
            SubmitOutcome::Unscored { .. }
        ));

        // Window is full now; |10.4 - 10.0| <= 0.5 is in tolerance.
        match c.submit(&body(2, 10.4)).await.unwrap() {
            SubmitOutcome::Scored {
                prediction,
                is_anomaly,
                ..
            } => {
                assert_eq!(prediction, 10.0);
                assert!(!is_anomaly);
            }
            other => panic!("expected Scored, got {other:?}"),
        }

        // |11.0 - 10.0| > 0.5 diverges.
        match c.submit(&body(3, 11.0)).await.unwrap() {
            SubmitOutcome::Scored { is_anomaly, .. } => assert!(is_anomaly),
            other => panic!("expected Scored, got {other:?}"),
        }

        let rows = store.fetch_latest("obs", 10).await.unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].is_anomaly, Some(false));
        assert_eq!(rows[3].is_anomaly, Some(true));
    }

    #[tokio::test]
    async fn duplicate_timestamp_is_a_conflict_with_one_row() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(StubOracle::returning(10.0)), 3);

        c.submit(&body(0, 10.0)).await.unwrap();
        let err = c.submit(&body(0, 10.0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Conflict(_)));
        assert_eq!(err.kind(), "conflict");
        assert_eq!(store.row_count("obs"), 1);
    }

    #[tokio::test]
    async fn oracle_failure_rejects_without_persisting_and_stream_recovers() {
        let store = Arc::new(InMemoryStore::new());
        let oracle = Arc::new(StubOracle::failing_on(10.0, 3));
        let c = coordinator_with(store.clone(), oracle.clone(), 2);

        // Seed the window (2 cold-start rows), then stream 5 scorable records.
        c.submit(&body(0, 10.0)).await.unwrap();
        c.submit(&body(1, 10.0)).await.unwrap();

        let mut outcomes = Vec::new();
        for (i, hour) in (2..7).enumerate() {
            let result = c.submit(&body(hour, 10.0)).await;
            if i == 2 {
                // Third oracle call fails: rejected, nothing persisted.
                let err = result.unwrap_err();
                assert_eq!(err.kind(), "oracle_error");
                assert!(err.retry_safe());
            } else {
                outcomes.push(result.unwrap());
            }
        }
        assert_eq!(outcomes.len(), 4);
        assert_eq!(store.row_count("obs"), 6);

        // Retry of the failed record succeeds; the data was never lost.
        assert!(matches!(
            c.submit(&body(4, 10.0)).await.unwrap(),
            SubmitOutcome::Scored { .. }
        ));
        assert_eq!(store.row_count("obs"), 7);
    }

    #[tokio::test]
    async fn schema_drift_is_rejected_and_not_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(StubOracle::returning(10.0)), 3);

        // First record fixes the schema {date, high, volume}.
        c.submit(&body(0, 10.0)).await.unwrap();

        // Later record missing `volume`: drift, rejected, never null-padded.
        let missing = json!({"date": "2021-03-01T01:00:00Z", "high": 10.0});
        let err = c.submit(&missing).await.unwrap_err();
        assert_eq!(err.kind(), "data_quality_error");
        assert!(err.to_string().contains("volume"));
        assert_eq!(store.row_count("obs"), 1);

        // Unknown extra field is drift too.
        let extra = json!({
            "date": "2021-03-01T02:00:00Z",
            "high": 10.0,
            "volume": 100,
            "vwap": 9.9,
        });
        let err = c.submit(&extra).await.unwrap_err();
        assert_eq!(err.kind(), "data_quality_error");
        assert_eq!(store.row_count("obs"), 1);
    }

    #[tokio::test]
    async fn missing_target_is_validation_error() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(StubOracle::returning(10.0)), 3);

        let err = c
            .submit(&json!({"date": "2021-03-01T00:00:00Z", "volume": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(store.row_count("obs"), 0);
    }

    #[tokio::test]
    async fn oracle_timeout_is_an_oracle_error() {
        let store = Arc::new(InMemoryStore::new());
        let c = coordinator_with(store.clone(), Arc::new(SlowOracle), 1);

        c.submit(&body(0, 10.0)).await.unwrap();
        let err = c.submit(&body(1, 10.0)).await.unwrap_err();
        assert_eq!(err.kind(), "oracle_error");
        assert!(matches!(
            err,
            PipelineError::Oracle(OracleError::Timeout(_))
        ));
        // The timed-out record was not persisted.
        assert_eq!(store.row_count("obs"), 1);
    }

    #[tokio::test]
    async fn ambiguous_chronology_never_reaches_the_oracle() {
        /// Store that violates the ordering contract on purpose.
        struct DisorderedStore {
            rows: Vec<ScoredRecord>,
        }

        #[async_trait]
        impl StorageAdapter for DisorderedStore {
            async fn table_exists(&self, _t: &str) -> Result<bool, StorageError> {
                Ok(true)
            }
            async fn create_table(
                &self,
                _t: &str,
                _s: &TableSchema,
            ) -> Result<(), StorageError> {
                Ok(())
            }
            async fn insert(&self, _t: &str, _r: &ScoredRecord) -> Result<(), StorageError> {
                Ok(())
            }
            async fn fetch_latest(
                &self,
                _t: &str,
                _limit: usize,
            ) -> Result<Vec<ScoredRecord>, StorageError> {
                Ok(self.rows.clone())
            }
            async fn update_flag(
                &self,
                _t: &str,
                timestamp: DateTime<Utc>,
                _f: bool,
            ) -> Result<(), StorageError> {
                Err(StorageError::NotFound {
                    table: "obs".to_string(),
                    timestamp,
                })
            }
        }

        let dup = Observation::from_json(&body(0, 10.0), "date").unwrap();
        let store = Arc::new(DisorderedStore {
            rows: vec![
                ScoredRecord::new(dup.clone(), None),
                ScoredRecord::new(dup, None),
            ],
        });
        let oracle = Arc::new(StubOracle::returning(10.0));
        let c = PipelineCoordinator::new(
            store,
            oracle.clone(),
            Arc::new(IdentityTransform),
            config(2),
        );

        let err = c.submit(&body(5, 10.0)).await.unwrap_err();
        assert_eq!(err.kind(), "ordering_violation");
        assert_eq!(oracle.call_count(), 0);
    }
}
