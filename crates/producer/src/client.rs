//! Submission client for the pipeline's HTTP boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The pipeline classified and rejected the record.
    #[error("record rejected ({kind}): {message}")]
    Rejected {
        kind: String,
        message: String,
        retry_safe: bool,
    },

    /// The boundary itself was unreachable.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Acknowledgement of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAck {
    Scored { is_anomaly: bool },
    /// Cold start: persisted with unset flag.
    Unscored,
}

/// Where records go. The HTTP implementation is the production one; tests
/// substitute a recording fake.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn submit(&self, record: &JsonValue) -> Result<SubmitAck, SubmitError>;
}

/// `POST`s each record to the coordinator's `/records` endpoint.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: format!("{}/records", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn submit(&self, record: &JsonValue) -> Result<SubmitAck, SubmitError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        let status = response.status();
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| SubmitError::Transport(format!("unreadable response: {e}")))?;

        if status.is_success() {
            return match body["status"].as_str() {
                Some("scored") => Ok(SubmitAck::Scored {
                    is_anomaly: body["is_anomaly"].as_bool().unwrap_or(false),
                }),
                Some("unscored") => Ok(SubmitAck::Unscored),
                other => Err(SubmitError::Transport(format!(
                    "unexpected acknowledgement status {other:?}"
                ))),
            };
        }

        Err(SubmitError::Rejected {
            kind: body["error"].as_str().unwrap_or("unknown").to_string(),
            message: body["message"].as_str().unwrap_or("").to_string(),
            retry_safe: body["retry_safe"].as_bool().unwrap_or(false),
        })
    }
}
