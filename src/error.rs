//! Boundary error type and [`axum::response::IntoResponse`] implementation.
//!
//! Internal code uses `anyhow` freely; the five kinds visible at the tool and
//! HTTP boundaries are carried by [`OracleError`] so transports can map them
//! to status codes without string matching.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// An error surfaced to a tool caller or HTTP client.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Bad input: empty query, out-of-range limit, unknown type, missing field.
    #[error("{0}")]
    Validation(String),

    /// Thread, decision, trace, document, or file not present.
    #[error("{0}")]
    NotFound(String),

    /// Learn file already exists for date+slug, or illegal status transition.
    #[error("{0}")]
    Conflict(String),

    /// The vector backend is unreachable or timed out and the request
    /// cannot be served without it. Hybrid retrieval never raises this —
    /// it degrades to keyword-only with a `warning` instead.
    #[error("{0}")]
    Degraded(String),

    /// Anything else — storage failures, poisoned locks, serialization.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for OracleError {
    fn from(e: rusqlite::Error) -> Self {
        OracleError::Internal(e.into())
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(e: serde_json::Error) -> Self {
        OracleError::Internal(e.into())
    }
}

impl IntoResponse for OracleError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            OracleError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
            OracleError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            OracleError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            OracleError::Degraded(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            OracleError::Internal(e) => {
                tracing::error!(error = %e, "internal error in request handler");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
