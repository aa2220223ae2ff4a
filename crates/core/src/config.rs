//! Pipeline configuration.
//!
//! All recognized options with their defaults, validated eagerly at startup.
//! Values come from `DRIFTWATCH_*` environment variables; an unset variable
//! falls back to its default, a malformed or out-of-range value is a
//! [`ConfigError`] rather than a silent fallback.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config '{key}': cannot parse '{value}'")]
    Parse { key: String, value: String },

    #[error("config '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Whether `s` is safe to use as a SQL table/column identifier.
pub fn valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Recognized pipeline options.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Window size N: how many recent rows feed one prediction.
    pub sequence_length: usize,
    /// Anomaly threshold, compared with strict `>` in raw units.
    pub threshold: f64,
    /// Producer pacing between record submissions.
    pub submission_interval: Duration,
    /// Destination table for scored records.
    pub table_name: String,
    /// Field evaluated for anomaly.
    pub target_field: String,
    /// Field carrying the record timestamp.
    pub timestamp_field: String,
    /// Upper bound on one oracle call.
    pub oracle_timeout: Duration,
    /// Upper bound on one storage round-trip.
    pub storage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sequence_length: 96,
            threshold: 0.5,
            submission_interval: Duration::from_secs(1),
            table_name: "observations".to_string(),
            target_field: "high".to_string(),
            timestamp_field: "date".to_string(),
            oracle_timeout: Duration::from_secs(5),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    /// Load from process environment (`DRIFTWATCH_*`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source (injectable for tests).
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("DRIFTWATCH_SEQUENCE_LENGTH") {
            cfg.sequence_length = parse(&v, "DRIFTWATCH_SEQUENCE_LENGTH")?;
        }
        if let Some(v) = lookup("DRIFTWATCH_THRESHOLD") {
            cfg.threshold = parse(&v, "DRIFTWATCH_THRESHOLD")?;
        }
        if let Some(v) = lookup("DRIFTWATCH_INTERVAL_SECS") {
            let secs: f64 = parse(&v, "DRIFTWATCH_INTERVAL_SECS")?;
            if !(secs.is_finite() && secs > 0.0) {
                return Err(ConfigError::invalid(
                    "DRIFTWATCH_INTERVAL_SECS",
                    "must be a positive number of seconds",
                ));
            }
            cfg.submission_interval = Duration::from_secs_f64(secs);
        }
        if let Some(v) = lookup("DRIFTWATCH_TABLE") {
            cfg.table_name = v;
        }
        if let Some(v) = lookup("DRIFTWATCH_TARGET_FIELD") {
            cfg.target_field = v;
        }
        if let Some(v) = lookup("DRIFTWATCH_TIMESTAMP_FIELD") {
            cfg.timestamp_field = v;
        }
        if let Some(v) = lookup("DRIFTWATCH_ORACLE_TIMEOUT_SECS") {
            cfg.oracle_timeout = Duration::from_secs(parse(&v, "DRIFTWATCH_ORACLE_TIMEOUT_SECS")?);
        }
        if let Some(v) = lookup("DRIFTWATCH_STORAGE_TIMEOUT_SECS") {
            cfg.storage_timeout = Duration::from_secs(parse(&v, "DRIFTWATCH_STORAGE_TIMEOUT_SECS")?);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_length == 0 {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_SEQUENCE_LENGTH",
                "must be a positive integer",
            ));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_THRESHOLD",
                "must be a positive finite number",
            ));
        }
        if self.submission_interval.is_zero() {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_INTERVAL_SECS",
                "must be positive",
            ));
        }
        if !valid_identifier(&self.table_name) {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_TABLE",
                "must be a valid identifier ([a-zA-Z_][a-zA-Z0-9_]*)",
            ));
        }
        if self.target_field.is_empty() {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_TARGET_FIELD",
                "must be non-empty",
            ));
        }
        if self.timestamp_field.is_empty() {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_TIMESTAMP_FIELD",
                "must be non-empty",
            ));
        }
        if self.oracle_timeout.is_zero() || self.storage_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "DRIFTWATCH_ORACLE_TIMEOUT_SECS",
                "timeouts must be positive",
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        key: key.to_string(),
        value: value.to_string(),
    })
}
