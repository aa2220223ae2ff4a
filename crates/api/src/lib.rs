//! `driftwatch-api` — HTTP service boundary for the anomaly pipeline.

pub mod app;
