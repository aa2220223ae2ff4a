use anyhow::Context;

use driftwatch_core::PipelineConfig;
use driftwatch_producer::{HttpSink, JsonLinesSource, Producer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    driftwatch_observability::init();

    let config = PipelineConfig::from_env()?;
    let source_path = std::env::var("DRIFTWATCH_SOURCE")
        .context("DRIFTWATCH_SOURCE must point to a JSON-lines record file")?;
    let api_url = std::env::var("DRIFTWATCH_API_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

    let mut source = JsonLinesSource::open(&source_path)
        .with_context(|| format!("failed to open source '{source_path}'"))?;

    let producer = Producer::new(HttpSink::new(&api_url), config.submission_interval);
    let shutdown = producer.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.notify_one();
        }
    });

    let report = producer.run(&mut source).await;
    tracing::info!(
        submitted = report.submitted,
        scored = report.scored,
        anomalies = report.anomalies,
        unscored = report.unscored,
        rejected = report.rejected,
        unreadable = report.unreadable,
        "stream finished"
    );
    Ok(())
}
