//! Request/response DTOs.

use serde::Deserialize;

/// Query for `GET /records`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Body for `PATCH /records/:timestamp/flag`.
#[derive(Debug, Deserialize)]
pub struct FlagUpdateRequest {
    pub is_anomaly: bool,
}
