//! Error types for tealforge-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tealforge_core::{ArtifactSet, CompileError, FailureClass};
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request rejected before reaching the compile pipeline
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// Compile lifecycle failure
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Http { status, .. } => *status,
            ApiError::Compile(err) => match err.class() {
                FailureClass::Client => StatusCode::BAD_REQUEST,
                FailureClass::Server => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// Uniform response envelope for `/compile`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<ArtifactSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompileResponse {
    pub fn success(files: ArtifactSet) -> Self {
        Self {
            ok: true,
            files: Some(files),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            files: None,
            error: Some(error.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "compile request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "compile request rejected");
        }

        (status, Json(CompileResponse::failure(message))).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tealforge_core::{CollectError, PayloadError};

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::from(CompileError::Validation(PayloadError::MissingCode))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );

        assert_eq!(
            ApiError::from(CompileError::NoArtifacts { expected: vec![] })
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        assert_eq!(
            ApiError::Http {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                message: "too big".to_string(),
            }
            .into_response()
            .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_envelope_shape() {
        let failure = serde_json::to_value(CompileResponse::failure("nope")).unwrap();
        assert_eq!(failure, serde_json::json!({ "ok": false, "error": "nope" }));

        let success = serde_json::to_value(CompileResponse::success(ArtifactSet::new())).unwrap();
        assert_eq!(success, serde_json::json!({ "ok": true, "files": {} }));
    }

    #[tokio::test]
    async fn test_collect_error_renders_500_envelope() {
        let err = ApiError::from(CompileError::from(CollectError {
            path: "artifacts/Counter.arc32.json".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: CompileResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!envelope.ok);
        assert!(envelope.files.is_none());
        assert!(envelope
            .error
            .unwrap()
            .starts_with("Failed to read artifacts under artifacts/Counter.arc32.json"));
    }
}
