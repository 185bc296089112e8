//! Failure taxonomy for the analyze pipeline and its mapping onto HTTP
//! responses.
//!
//! Every stage returns `Result<_, AnalyzeError>`; the handler converts the
//! error exactly once through [`IntoResponse`]. Bodies never echo notes,
//! image data or engine detail: internal failures are logged here and the
//! client only sees a generic message plus an error-kind tag.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::engine::EngineFailure;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("image decode failed: {0}")]
    ImageDecode(String),
    #[error("request body exceeded {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("engine failure [{kind}]: {message}")]
    Engine { kind: String, message: String },
    #[error("engine call exceeded {after_ms}ms")]
    EngineTimeout { after_ms: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    /// Stable tag used for metrics and the `error_type` body field.
    pub fn kind(&self) -> &str {
        match self {
            AnalyzeError::Validation(_) => "ValidationError",
            AnalyzeError::InvalidBody(_) => "InvalidBody",
            AnalyzeError::ImageDecode(_) => "ImageDecodeError",
            AnalyzeError::PayloadTooLarge { .. } => "PayloadTooLarge",
            AnalyzeError::Engine { kind, .. } => kind.as_str(),
            AnalyzeError::EngineTimeout { .. } => "EngineTimeout",
            AnalyzeError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::Validation(_)
            | AnalyzeError::InvalidBody(_)
            | AnalyzeError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Engine { .. }
            | AnalyzeError::EngineTimeout { .. }
            | AnalyzeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the sanitized outward body for this failure.
    pub fn to_body(&self) -> ErrorResponse {
        match self {
            AnalyzeError::Validation(detail) => ErrorResponse::new(
                detail.clone(),
                "Please provide patient symptoms and clinical information",
            ),
            AnalyzeError::InvalidBody(detail) => ErrorResponse::new(
                detail.clone(),
                "Send a JSON object with a 'notes' field",
            ),
            AnalyzeError::ImageDecode(_) => ErrorResponse::new(
                "Invalid image format",
                "Please provide a valid base64-encoded image",
            ),
            AnalyzeError::PayloadTooLarge { limit } => ErrorResponse::new(
                format!("Request too large (body exceeded limit {} bytes)", limit),
                "Reduce the image size and try again",
            ),
            AnalyzeError::Engine { .. }
            | AnalyzeError::EngineTimeout { .. }
            | AnalyzeError::Internal(_) => ErrorResponse {
                error_type: Some(self.kind().to_string()),
                ..ErrorResponse::new(
                    "Analysis failed",
                    "An error occurred during analysis. Please try again.",
                )
            },
        }
    }
}

impl From<EngineFailure> for AnalyzeError {
    fn from(failure: EngineFailure) -> Self {
        AnalyzeError::Engine {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind(), error = %self, "analysis failed");
        } else {
            tracing::warn!(kind = %self.kind(), error = %self, "request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

/// Error envelope shared by every non-2xx response.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            error_type: None,
        }
    }
}

pub(crate) fn not_found() -> Response {
    let body = ErrorResponse::new("Endpoint not found", "Please check the API documentation");
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
