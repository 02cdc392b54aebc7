//! # Error Handling
//!
//! Defines the error type returned across the handler boundary and its
//! conversion to HTTP responses.
//!
//! Every failure a request can hit maps to a distinct status code with a
//! structured JSON body, so clients can tell a malformed upload apart from a
//! decode failure or an overloaded accelerator:
//!
//! ```json
//! {
//!   "error": {
//!     "type": "unsupported_audio",
//!     "message": "WAV parse failed: ...",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure kinds surfaced by the transcription service.
#[derive(Debug)]
pub enum AppError {
    /// The multipart request was malformed or missing its file field
    BadUpload(String),

    /// The uploaded bytes could not be decoded as audio
    UnsupportedAudio(String),

    /// The upload exceeded the configured size cap
    PayloadTooLarge(String),

    /// No model is loaded and ready to serve inference
    ModelUnavailable(String),

    /// Inference or any other server-side step failed
    Internal(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadUpload(msg) => write!(f, "Bad upload: {}", msg),
            AppError::UnsupportedAudio(msg) => write!(f, "Unsupported audio: {}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Maps each failure kind to a status code and machine-readable type tag.
///
/// ## Status mapping:
/// - BadUpload → 400
/// - UnsupportedAudio → 422
/// - PayloadTooLarge → 413
/// - ModelUnavailable → 503
/// - Internal / ConfigError → 500
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::BadUpload(msg) => (StatusCode::BAD_REQUEST, "bad_upload", msg.clone()),
            AppError::UnsupportedAudio(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unsupported_audio",
                msg.clone(),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                msg.clone(),
            ),
            AppError::ModelUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "model_unavailable",
                msg.clone(),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// anyhow errors carry no HTTP intent, so they land in the 500 bucket.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// I/O failures while spooling or reading the upload are server-side.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Multipart protocol errors mean the client sent a broken request body.
impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::BadUpload(format!("Multipart error: {}", err))
    }
}

/// Engine failures keep their class so each gets its own status code.
impl From<crate::transcription::TranscribeError> for AppError {
    fn from(err: crate::transcription::TranscribeError) -> Self {
        use crate::transcription::TranscribeError;
        let message = err.to_string();
        match err {
            TranscribeError::NotLoaded => AppError::ModelUnavailable(message),
            TranscribeError::UnsupportedAudio(_) => AppError::UnsupportedAudio(message),
            TranscribeError::Inference(_) => AppError::Internal(message),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (AppError::BadUpload("x".into()), StatusCode::BAD_REQUEST),
            (
                AppError::UnsupportedAudio("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::PayloadTooLarge("x".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::ModelUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.error_response().status(), expected, "{}", err);
        }
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: AppError = anyhow::anyhow!("model exploded").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(err.to_string().contains("model exploded"));
    }
}
