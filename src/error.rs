//! Error taxonomy for the optimizer pipeline
//!
//! Every layer returns a `Result<T, SpectyraError>`. Auxiliary failures
//! (cache/state store) are caught at the call site and converted to a
//! degraded-ok fallback before they ever reach this enum; they're still
//! named here so the ledger and logs can record that a downgrade happened.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SpectyraError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("auxiliary degraded: {0}")]
    DegradedAuxiliary(String),

    #[error("quality guard failed: {0}")]
    QualityGuardFailed(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SpectyraError {
    /// Stable machine-readable code, returned to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            SpectyraError::InvalidInput(_) => "invalid_input",
            SpectyraError::UpstreamUnavailable(_) => "upstream_unavailable",
            SpectyraError::Cancelled => "cancelled",
            SpectyraError::DegradedAuxiliary(_) => "degraded_auxiliary",
            SpectyraError::QualityGuardFailed(_) => "quality_guard_failed",
            SpectyraError::InvariantViolation(_) => "invariant_violation",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SpectyraError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SpectyraError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SpectyraError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            SpectyraError::DegradedAuxiliary(_) => StatusCode::OK,
            SpectyraError::QualityGuardFailed(_) => StatusCode::OK,
            SpectyraError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
}

/// The only place in the crate that maps an error kind to an HTTP response.
/// `InvariantViolation` never leaks its internal message to the client.
impl IntoResponse for SpectyraError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = if let SpectyraError::InvariantViolation(detail) = &self {
            tracing::error!(detail, "invariant violation");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error_code: code,
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, SpectyraError>;
