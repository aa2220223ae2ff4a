//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic data/contract failures (malformed input,
/// non-numeric fields, schema drift). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A submitted record failed validation (e.g. missing target field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A field value could not be coerced to a numeric feature.
    #[error("field '{field}' is not numeric: {value}")]
    NonNumericField { field: String, value: String },

    /// An observation does not match the negotiated table schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn non_numeric(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NonNumericField {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }
}
