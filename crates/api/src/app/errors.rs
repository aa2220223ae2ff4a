use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use driftwatch_pipeline::PipelineError;

/// Map a pipeline rejection to a structured HTTP response.
///
/// Insufficient history never reaches this function: cold start is a success
/// (persisted unscored), not an error.
pub fn pipeline_error_to_response(err: PipelineError) -> axum::response::Response {
    let status = match &err {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::DataQuality(_) | PipelineError::OrderingViolation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PipelineError::Oracle(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Conflict(_) => StatusCode::CONFLICT,
    };
    let retry_safe = err.retry_safe();
    (
        status,
        axum::Json(json!({
            "error": err.kind(),
            "message": err.to_string(),
            "retry_safe": retry_safe,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
