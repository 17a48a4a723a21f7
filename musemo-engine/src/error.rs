//! Error types for musemo-engine
//!
//! Two layers:
//! - `StageError`: stage-local failures inside the ingestion pipeline. These
//!   never cross the orchestrator boundary; they are recorded as false status
//!   flags.
//! - `EngineError`: request-level errors returned to API callers, with an
//!   HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Stage-local failure inside one pipeline stage
///
/// Converted into status flags by the orchestrator; a failed stage never
/// aborts its siblings unless they depend on its output.
#[derive(Debug, Error)]
pub enum StageError {
    /// Source audio could not be fetched
    #[error("Upstream fetch failed: {0}")]
    Fetch(String),

    /// Audio payload could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// External descriptor extractor failed or produced an unexpected schema
    #[error("Descriptor extraction failed: {0}")]
    Extraction(String),

    /// Spectrogram rendering failed
    #[error("Spectrogram rendering failed: {0}")]
    Render(String),

    /// Artifact store operation failed
    #[error("Store operation failed: {0}")]
    Store(String),

    /// I/O error while staging temporary copies
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing request fields (400)
    #[error("Invalid request: {0}")]
    Input(String),

    /// Unknown track namespace (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A required modality is absent at inference gather (400, distinct code)
    #[error("Missing modality: {0}")]
    MissingModality(String),

    /// Model weights could not be loaded (500, request-fatal only)
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// Fault the engine could not attribute to a single stage (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// musemo-common error
    #[error("Common error: {0}")]
    Common(#[from] musemo_common::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            EngineError::Input(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            EngineError::MissingModality(msg) => {
                (StatusCode::BAD_REQUEST, "MISSING_MODALITY", msg)
            }
            EngineError::ModelLoad(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_LOAD", msg)
            }
            EngineError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            EngineError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            EngineError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers and engine entry points
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::Decode("truncated frame".to_string());
        assert_eq!(err.to_string(), "Decode failed: truncated frame");
    }

    #[test]
    fn test_missing_modality_is_client_error() {
        let response = EngineError::MissingModality("spectrogram".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_model_load_is_server_error() {
        let response = EngineError::ModelLoad("no such file".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
