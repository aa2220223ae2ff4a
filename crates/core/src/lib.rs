//! `driftwatch-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the observation/record model, table schema negotiation, the anomaly scorer,
//! scale/descale transforms, and pipeline configuration.

pub mod config;
pub mod error;
pub mod features;
pub mod observation;
pub mod scorer;
pub mod transform;

pub use config::{ConfigError, PipelineConfig};
pub use error::{DomainError, DomainResult};
pub use features::FeatureMatrix;
pub use observation::{FieldKind, FieldValue, Observation, ScoredRecord, TableSchema};
pub use scorer::is_anomalous;
pub use transform::{AffineTransform, IdentityTransform, TargetTransform};
