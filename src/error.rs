use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by a [`TransactionalStore`](crate::store::TransactionalStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A document in the write set changed since it was read.
    #[error("write conflict on {collection}/{key}")]
    Conflict { collection: &'static str, key: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Why an admission check could not produce a decision. Always fail-closed.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("gave up after {attempts} conflicting attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": "Rate limit check failed",
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// Rejected configuration. Raised at construction or reload, never per request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max requests per window must be at least 1")]
    InvalidMax,

    #[error("window must be between 1ms and {max_days} days, got {got_ms}ms")]
    InvalidWindow { got_ms: u128, max_days: u64 },

    #[error("suspicious ip threshold must be at least 1")]
    InvalidThreshold,

    #[error("grace period must not exceed {max_days} days")]
    InvalidGrace { max_days: u64 },

    #[error("retry policy needs at least one attempt")]
    InvalidRetry,
}

pub type StoreResult<T> = Result<T, StoreError>;
