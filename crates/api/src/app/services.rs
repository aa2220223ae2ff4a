//! Infrastructure wiring for the API process.
//!
//! The coordinator, storage adapter, oracle and transforms are constructed
//! here, once, and shared behind `Arc`; no ambient/global handles.

use std::sync::Arc;

use driftwatch_core::{AffineTransform, IdentityTransform, PipelineConfig, TargetTransform};
use driftwatch_pipeline::{EwmaOracle, Oracle, PipelineCoordinator};
use driftwatch_storage::{InMemoryStore, StorageAdapter};

#[cfg(feature = "postgres")]
use driftwatch_storage::PostgresStore;

/// Shared service graph handed to every handler.
pub struct AppServices {
    pub coordinator: Arc<PipelineCoordinator>,
    pub storage: Arc<dyn StorageAdapter>,
}

/// Wire up the production service graph from configuration.
///
/// Storage: Postgres when `DATABASE_URL` is set (and the `postgres` feature is
/// compiled in), otherwise the in-memory store with a warning (useful for dev
/// runs, useless across restarts).
pub async fn build_services(config: PipelineConfig) -> anyhow::Result<AppServices> {
    let storage = select_storage().await?;
    let transform = select_transform();
    let oracle = build_oracle(&config, transform.clone())?;

    let coordinator = Arc::new(PipelineCoordinator::new(
        storage.clone(),
        oracle,
        transform,
        config,
    ));

    Ok(AppServices {
        coordinator,
        storage,
    })
}

/// Test/dev wiring over explicit collaborators.
pub fn build_services_with(
    storage: Arc<dyn StorageAdapter>,
    oracle: Arc<dyn Oracle>,
    transform: Arc<dyn TargetTransform>,
    config: PipelineConfig,
) -> AppServices {
    let coordinator = Arc::new(PipelineCoordinator::new(
        storage.clone(),
        oracle,
        transform,
        config,
    ));
    AppServices {
        coordinator,
        storage,
    }
}

async fn select_storage() -> anyhow::Result<Arc<dyn StorageAdapter>> {
    match std::env::var("DATABASE_URL") {
        #[cfg(feature = "postgres")]
        Ok(url) => {
            let store = PostgresStore::connect(&url).await?;
            tracing::info!("using postgres storage adapter");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        Ok(_) => {
            anyhow::bail!("DATABASE_URL set but the 'postgres' feature is not compiled in")
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory storage (not durable)");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// The pre-fitted scale/descale pair. Parameters come from the environment;
/// with neither set the oracle works directly in raw units.
fn select_transform() -> Arc<dyn TargetTransform> {
    let factor = std::env::var("DRIFTWATCH_SCALE_FACTOR")
        .ok()
        .and_then(|v| v.parse::<f64>().ok());
    let offset = std::env::var("DRIFTWATCH_SCALE_OFFSET")
        .ok()
        .and_then(|v| v.parse::<f64>().ok());

    match (factor, offset) {
        (Some(factor), offset) => match AffineTransform::new(factor, offset.unwrap_or(0.0)) {
            Some(t) => Arc::new(t),
            None => {
                tracing::warn!("invalid scale parameters; falling back to identity transform");
                Arc::new(IdentityTransform)
            }
        },
        _ => Arc::new(IdentityTransform),
    }
}

fn build_oracle(
    config: &PipelineConfig,
    transform: Arc<dyn TargetTransform>,
) -> anyhow::Result<Arc<dyn Oracle>> {
    let alpha = std::env::var("DRIFTWATCH_EWMA_ALPHA")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.3);
    let oracle = EwmaOracle::new(config.target_field.clone(), alpha, transform)
        .ok_or_else(|| anyhow::anyhow!("DRIFTWATCH_EWMA_ALPHA must be in (0, 1], got {alpha}"))?;
    Ok(Arc::new(oracle))
}
