//! HTTP error mapping for the compile server.
//!
//! Engine errors carry enough structure to pick the right status code here;
//! handlers just use `?`. A failed compile is special-cased: its body is the
//! captured toolchain log verbatim so users can self-diagnose.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes, stable for client-side handling.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    PayloadTooLarge,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Structured error body for everything except toolchain failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str(),
            error: message.into(),
        }
    }
}

/// Server error type covering every handler.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Engine(#[from] lib_core::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Shutdown not allowed")]
    ShutdownNotAllowed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

fn engine_error_status(error: &lib_core::Error) -> StatusCode {
    use lib_core::Error;
    match error {
        Error::InvalidInput(_)
        | Error::BadBuildMode
        | Error::QuickBuildsOnly
        | Error::PathTraversal(_)
        | Error::ArchiveBomb
        | Error::ToolchainFailed { .. } => StatusCode::BAD_REQUEST,

        Error::ExampleNotFound(_) => StatusCode::NOT_FOUND,

        Error::Io(_)
        | Error::Zip(_)
        | Error::NoSourceFound(_)
        | Error::MultipleSourceDirs(_)
        | Error::ArtifactsMissing(_)
        | Error::SyncFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error_code(error: &lib_core::Error) -> ErrorCode {
    match engine_error_status(error) {
        StatusCode::BAD_REQUEST => ErrorCode::BadRequest,
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        _ => ErrorCode::InternalError,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self, "request error");

        match self {
            // The toolchain log goes back verbatim so users can read the
            // compiler's own diagnostics.
            ServerError::Engine(err @ lib_core::Error::ToolchainFailed { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }

            ServerError::Engine(err) => {
                let status = engine_error_status(&err);
                let body = ErrorResponse::new(engine_error_code(&err), err.to_string());
                (status, Json(body)).into_response()
            }

            ServerError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(ErrorCode::Unauthorized, "Unauthorized")),
            )
                .into_response(),

            ServerError::ShutdownNotAllowed => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    ErrorCode::Forbidden,
                    "Shutdown is not enabled on this server",
                )),
            )
                .into_response(),

            ServerError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(ErrorCode::BadRequest, msg)),
            )
                .into_response(),

            ServerError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(ErrorCode::NotFound, msg)),
            )
                .into_response(),

            ServerError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(ErrorCode::InternalError, msg)),
            )
                .into_response(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_map_to_400() {
        assert_eq!(
            engine_error_status(&lib_core::Error::BadBuildMode),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            engine_error_status(&lib_core::Error::QuickBuildsOnly),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_pipeline_errors_map_to_500() {
        assert_eq!(
            engine_error_status(&lib_core::Error::NoSourceFound("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            engine_error_status(&lib_core::Error::ArtifactsMissing("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_toolchain_failure_body_is_verbatim_log() {
        let err = ServerError::Engine(lib_core::Error::ToolchainFailed {
            exit_code: 2,
            log: "error: no loop() defined".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
