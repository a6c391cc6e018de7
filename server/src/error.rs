use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::TtsError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TtsError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "validation_error",
            ApiError::Unsupported(_) => "capability_error",
            ApiError::TtsError(_) => "engine_error",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::InvalidInput(msg)
            | ApiError::Unsupported(msg)
            | ApiError::TtsError(msg)
            | ApiError::InternalError(msg) => msg,
        }
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::Validation(msg) => ApiError::InvalidInput(msg),
            TtsError::Capability(msg) => ApiError::Unsupported(msg),
            TtsError::Engine(msg) => ApiError::TtsError(msg),
            TtsError::Transport(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub detail: String,
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::TtsError(msg) => tracing::error!("TTS error: {}", msg),
            ApiError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            _ => tracing::debug!("Rejected request: {}", self),
        }

        let body = Json(ErrorResponse {
            error: self.kind(),
            detail: self.detail().to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// `Json` whose rejections render as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
