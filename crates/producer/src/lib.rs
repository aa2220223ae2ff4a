//! `driftwatch-producer`
//!
//! **Responsibility:** drive a bounded or unbounded record source into the
//! pipeline's HTTP boundary at a fixed cadence.
//!
//! The producer is deliberately single-threaded and strictly sequential: one
//! in-flight record at a time, with the interval sleep acting as pacing. A
//! failed submission is logged and never halts the stream.

pub mod client;
pub mod runner;
pub mod source;

pub use client::{HttpSink, RecordSink, SubmitAck, SubmitError};
pub use runner::{Producer, ProducerReport};
pub use source::{JsonLinesSource, RecordSource, SourceError, VecSource};
