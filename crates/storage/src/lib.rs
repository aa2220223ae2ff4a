//! `driftwatch-storage`
//!
//! **Responsibility:** the durable-storage boundary of the pipeline.
//!
//! The pipeline depends only on the narrow [`StorageAdapter`] contract, never
//! on a specific engine. Two implementations ship:
//! - [`InMemoryStore`]: tests and single-process dev runs.
//! - `PostgresStore` (behind the `postgres` feature): the production engine.

pub mod adapter;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use adapter::{StorageAdapter, StorageError};
pub use in_memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
