//! Inference oracle interface.
//!
//! The pipeline treats prediction as an opaque capability: given an ordered
//! N×F feature window, return one scalar prediction in normalized space. Any
//! concrete backend (in-process, remote RPC, batch-precomputed lookup)
//! satisfies the trait identically; the coordinator makes exactly one call
//! per scoring decision and never learns anything about the model inside.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use driftwatch_core::{FeatureMatrix, TargetTransform};

#[derive(Debug, Error)]
pub enum OracleError {
    /// The backend could not produce a prediction (process down, model not
    /// loaded, remote call failed).
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its bounded timeout.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The window does not fit what the backend was configured for.
    #[error("invalid oracle input: {0}")]
    InvalidInput(String),

    /// The backend answered with something unusable (NaN, infinity).
    #[error("invalid oracle output: {0}")]
    InvalidOutput(String),
}

/// Single-method prediction capability.
#[async_trait]
pub trait Oracle: Send + Sync + 'static {
    /// Predict the next target value, in normalized space, from an ordered
    /// window of feature rows.
    async fn predict(&self, window: &FeatureMatrix) -> Result<f64, OracleError>;
}

/// Deterministic in-process oracle: exponentially weighted moving average of
/// the target column, emitted in normalized space via the scale transform.
///
/// This is the backend the service binary ships with so the pipeline runs end
/// to end without an external model server; it is not a stand-in for a real
/// regressor and exists to satisfy the capability, not to be accurate.
pub struct EwmaOracle {
    target_column: String,
    alpha: f64,
    transform: Arc<dyn TargetTransform>,
}

impl EwmaOracle {
    /// `alpha` is the smoothing factor in (0, 1]; `None` if out of range.
    pub fn new(
        target_column: impl Into<String>,
        alpha: f64,
        transform: Arc<dyn TargetTransform>,
    ) -> Option<Self> {
        if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
            return None;
        }
        Some(Self {
            target_column: target_column.into(),
            alpha,
            transform,
        })
    }
}

#[async_trait]
impl Oracle for EwmaOracle {
    async fn predict(&self, window: &FeatureMatrix) -> Result<f64, OracleError> {
        let series = window.column(&self.target_column).ok_or_else(|| {
            OracleError::InvalidInput(format!(
                "window has no '{}' column",
                self.target_column
            ))
        })?;
        if series.is_empty() {
            return Err(OracleError::InvalidInput("window is empty".to_string()));
        }

        let mut acc = series[0];
        for value in &series[1..] {
            acc = self.alpha * value + (1.0 - self.alpha) * acc;
        }

        let normalized = self.transform.scale(acc);
        if !normalized.is_finite() {
            return Err(OracleError::InvalidOutput(format!(
                "non-finite prediction {normalized}"
            )));
        }
        Ok(normalized)
    }
}
