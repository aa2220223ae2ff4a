use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{patch, post},
};
use chrono::{DateTime, Utc};

use driftwatch_pipeline::SubmitOutcome;
use driftwatch_storage::StorageError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 10_000;

pub fn router() -> Router {
    Router::new()
        .route("/records", post(submit_record).get(list_records))
        .route("/records/:timestamp/flag", patch(set_flag))
}

/// `POST /records`: submit one observation to the pipeline.
pub async fn submit_record(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    match services.coordinator.submit(&body).await {
        Ok(SubmitOutcome::Scored {
            timestamp,
            prediction,
            is_anomaly,
        }) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "status": "scored",
                "timestamp": timestamp.to_rfc3339(),
                "prediction": prediction,
                "is_anomaly": is_anomaly,
            })),
        )
            .into_response(),
        Ok(SubmitOutcome::Unscored { timestamp }) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "status": "unscored",
                "timestamp": timestamp.to_rfc3339(),
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(kind = e.kind(), "record rejected: {e}");
            errors::pipeline_error_to_response(e)
        }
    }
}

/// `GET /records?limit=K`: latest K rows, ascending, for read-only consumers.
pub async fn list_records(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    let table = &services.coordinator.config().table_name;

    match services.storage.fetch_latest(table, limit).await {
        Ok(rows) => {
            let records: Vec<serde_json::Value> = rows.iter().map(|r| r.to_json()).collect();
            Json(serde_json::json!({ "records": records })).into_response()
        }
        Err(e) => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "persistence_error",
            e.to_string(),
        ),
    }
}

/// `PATCH /records/:timestamp/flag`: point update of a persisted verdict
/// (operator path; the steady-state pipeline never rewrites flags).
pub async fn set_flag(
    Extension(services): Extension<Arc<AppServices>>,
    Path(timestamp): Path<String>,
    Json(body): Json<dto::FlagUpdateRequest>,
) -> axum::response::Response {
    let timestamp: DateTime<Utc> = match timestamp.parse() {
        Ok(ts) => ts,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "timestamp must be RFC 3339",
            );
        }
    };

    let table = &services.coordinator.config().table_name;
    match services
        .storage
        .update_flag(table, timestamp, body.is_anomaly)
        .await
    {
        Ok(()) => Json(serde_json::json!({
            "timestamp": timestamp.to_rfc3339(),
            "is_anomaly": body.is_anomaly,
        }))
        .into_response(),
        Err(StorageError::NotFound { .. }) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no record with timestamp {timestamp}"),
        ),
        Err(e) => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "persistence_error",
            e.to_string(),
        ),
    }
}
