//! Error types for the bot runtime
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Rate Limit Error ==
/// Raised when an upstream is requested faster than its limiter allows.
///
/// Carries the backoff a caller must observe before retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "The bot is trying to request {api_name} too quickly! Please wait `{:.3}` seconds before trying again.",
    .backoff.as_secs_f64()
)]
pub struct RateLimitError {
    /// Name of the guarded upstream
    pub api_name: String,
    /// Minimum additional wait before retrying
    pub backoff: Duration,
}

// == Pool Error ==
/// Transient failure to obtain a pooled connection.
#[derive(Error, Debug)]
pub enum PoolError {
    /// No connection was returned within the checkout timeout
    #[error("No connection available after waiting {waited:?}")]
    Exhausted { waited: Duration },

    /// Opening a fresh connection failed
    #[error("Failed to establish a new connection: {0}")]
    Connect(anyhow::Error),
}

// == Upstream Error ==
/// Failure of a rate-limited, memoized upstream call.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Fetch(#[from] anyhow::Error),
}

// == API Error ==
/// Errors surfaced by the admin HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the admin API.
pub type Result<T> = std::result::Result<T, ApiError>;
