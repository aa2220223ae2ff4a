//! `driftwatch-pipeline`
//!
//! **Responsibility:** the streaming window / inference / anomaly-scoring
//! pipeline.
//!
//! The [`coordinator::PipelineCoordinator`] turns a raw append-only stream
//! into a sequence of (prediction, anomaly-flag) decisions with strict append
//! order, at most one scoring decision per record, and durable state. It
//! depends on the storage contract from `driftwatch-storage` and treats
//! inference as an opaque [`oracle::Oracle`] capability.

pub mod coordinator;
pub mod oracle;
pub mod window;

pub use coordinator::{PipelineCoordinator, PipelineError, SubmitOutcome};
pub use oracle::{EwmaOracle, Oracle, OracleError};
pub use window::{WindowError, build_window};
