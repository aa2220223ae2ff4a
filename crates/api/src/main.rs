use driftwatch_core::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    driftwatch_observability::init();

    let config = PipelineConfig::from_env()?;
    let services = driftwatch_api::app::services::build_services(config).await?;
    let app = driftwatch_api::app::build_app(services);

    let addr =
        std::env::var("DRIFTWATCH_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
