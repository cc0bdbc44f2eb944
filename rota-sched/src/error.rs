//! Error types for rota-sched
//!
//! `SchedError` is the typed result every core operation returns. Conflicts
//! found by the analyzer are never errors; they are report annotations.
//! `ApiError` maps `SchedError` onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Core operation error
#[derive(Debug, Error)]
pub enum SchedError {
    /// Malformed input, rejected before any store write
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Nothing to schedule (no volunteers or no shifts)
    #[error("No data: {0}")]
    NoData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Solver answered with an unusable status or body; the store was not touched
    #[error("Solver error (status {status}): {message}")]
    Solver { status: u16, message: String },

    /// Solver did not answer in time; the store was not touched
    #[error("Solver timed out after {0:?}")]
    SolverTimeout(Duration),

    /// A store write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] rota_common::Error),

    /// Row changed since it was read (compare-and-swap mismatch)
    #[error("Concurrent update, retry: {0}")]
    ConflictRetry(String),

    /// Kiosk action not legal in the current step
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A multi-step sequence stopped after applying some steps
    #[error("Some steps failed: completed [{}], failed at {failed_step}: {message}", .completed.join(", "))]
    PartialFailure {
        completed: Vec<String>,
        failed_step: String,
        message: String,
    },
}

impl From<sqlx::Error> for SchedError {
    fn from(err: sqlx::Error) -> Self {
        SchedError::Persistence(rota_common::Error::Database(err))
    }
}

impl SchedError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SchedError::Validation(_) => "VALIDATION_ERROR",
            SchedError::NoData(_) => "NO_DATA",
            SchedError::NotFound(_) => "NOT_FOUND",
            SchedError::Solver { .. } => "SOLVER_ERROR",
            SchedError::SolverTimeout(_) => "SOLVER_TIMEOUT",
            SchedError::Persistence(_) => "PERSISTENCE_ERROR",
            SchedError::ConflictRetry(_) => "CONFLICT_RETRY",
            SchedError::InvalidTransition(_) => "INVALID_TRANSITION",
            SchedError::PartialFailure { .. } => "PARTIAL_FAILURE",
        }
    }
}

/// Result type for core operations
pub type SchedResult<T> = Result<T, SchedError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Sched(#[from] SchedError),
}

impl From<rota_common::Error> for ApiError {
    fn from(err: rota_common::Error) -> Self {
        ApiError::Sched(SchedError::Persistence(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Sched(err) => {
                let status = match err {
                    SchedError::Validation(_) | SchedError::NoData(_) => StatusCode::BAD_REQUEST,
                    SchedError::NotFound(_) => StatusCode::NOT_FOUND,
                    SchedError::Solver { .. } => StatusCode::BAD_GATEWAY,
                    SchedError::SolverTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    SchedError::ConflictRetry(_) | SchedError::InvalidTransition(_) => {
                        StatusCode::CONFLICT
                    }
                    SchedError::Persistence(rota_common::Error::ShiftInterval { .. }) => {
                        StatusCode::BAD_REQUEST
                    }
                    SchedError::Persistence(_) | SchedError::PartialFailure { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.code(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_message_lists_steps() {
        let err = SchedError::PartialFailure {
            completed: vec!["close previous assignment".into(), "check in".into()],
            failed_step: "issue assets".into(),
            message: "disk full".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("Some steps failed"));
        assert!(text.contains("close previous assignment, check in"));
        assert!(text.contains("issue assets"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SchedError::NoData("x".into()), StatusCode::BAD_REQUEST),
            (SchedError::SolverTimeout(Duration::from_secs(30)), StatusCode::GATEWAY_TIMEOUT),
            (SchedError::Solver { status: 500, message: "x".into() }, StatusCode::BAD_GATEWAY),
            (SchedError::ConflictRetry("x".into()), StatusCode::CONFLICT),
            (SchedError::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
