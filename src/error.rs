//! # Error Handling
//!
//! This module defines the error taxonomy shared by the codec, the media frame
//! adapter, the channel client and the loopback server.
//!
//! ## Error Kinds:
//! - **CodecFailure**: malformed or unsupported audio input. Recoverable, the
//!   caller logs it and carries on with an empty buffer.
//! - **MalformedEnvelope**: an inbound message that is not a valid media
//!   envelope. Recoverable, the caller skips the message and keeps listening.
//! - **TransportFailure**: the channel is closed or unreachable. Surfaced to the
//!   caller and never retried here.
//! - **ConfigError / ValidationError / Internal**: setup problems.
//!
//! ## Key Rust Concepts for Error Handling:
//! - **Result<T, E>**: every fallible operation returns one, and `?` propagates it
//! - **From trait**: third-party errors are converted into `AppError` automatically
//! - **ResponseError trait**: lets the loopback server turn an `AppError` into
//!   an HTTP response

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::MalformedEnvelope("missing `event` field".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Audio input could not be converted (bad WAV, unsupported format, zero rate)
    CodecFailure(String),

    /// Inbound envelope was unparsable or missed a required field
    MalformedEnvelope(String),

    /// Channel closed, refused or timed out at the network level
    TransportFailure(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Configuration or user input failed validation rules
    ValidationError(String),

    /// Anything else (I/O, task failures)
    Internal(String),
}

impl AppError {
    /// Machine-readable name of the error kind, used in JSON error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::CodecFailure(_) => "codec_failure",
            AppError::MalformedEnvelope(_) => "malformed_envelope",
            AppError::TransportFailure(_) => "transport_failure",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether a long-lived loop should log this error and keep going.
    ///
    /// Codec and envelope failures are local to one buffer or one message;
    /// everything else ends the current operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::CodecFailure(_) | AppError::MalformedEnvelope(_))
    }
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// Defines how errors are formatted when printed by the console reporter or
/// written to the log.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::CodecFailure(msg) => write!(f, "Codec failure: {}", msg),
            AppError::MalformedEnvelope(msg) => write!(f, "Malformed envelope: {}", msg),
            AppError::TransportFailure(msg) => write!(f, "Transport failure: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## HTTP Status Code Mapping:
/// - MalformedEnvelope/ValidationError → 400 (Bad Request)
/// - CodecFailure → 422 (Unprocessable Entity)
/// - TransportFailure → 502 (Bad Gateway)
/// - Internal/ConfigError → 500 (Internal Server Error)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "malformed_envelope",
///     "message": "missing field `event`",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = match self {
            AppError::MalformedEnvelope(_) | AppError::ValidationError(_) => {
                actix_web::http::StatusCode::BAD_REQUEST  // 400
            }
            AppError::CodecFailure(_) => actix_web::http::StatusCode::UNPROCESSABLE_ENTITY,  // 422
            AppError::TransportFailure(_) => actix_web::http::StatusCode::BAD_GATEWAY,  // 502
            AppError::ConfigError(_) | AppError::Internal(_) => {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR  // 500
            }
        };

        let message = match self {
            AppError::CodecFailure(msg)
            | AppError::MalformedEnvelope(msg)
            | AppError::TransportFailure(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::Internal(msg) => msg.clone(),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": self.kind(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// Collaborator traits return `anyhow::Result`; when their failures cross into
/// the core they become `Internal`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors almost always come from an inbound envelope.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedEnvelope(format!("JSON parsing error: {}", err))
    }
}

/// Invalid base64 in a `media.payload` field.
impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::MalformedEnvelope(format!("invalid base64 payload: {}", err))
    }
}

/// Automatic conversion from configuration errors to AppError.
///
/// ## When this happens:
/// - config.toml file has invalid syntax
/// - An `APP_` environment variable cannot be parsed into its field type
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// WAV parsing and writing failures.
impl From<hound::Error> for AppError {
    fn from(err: hound::Error) -> Self {
        AppError::CodecFailure(format!("WAV error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::TransportFailure(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::TransportFailure(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Usage Example:
/// ```rust,ignore
/// fn load(path: &Path) -> AppResult<Vec<u8>> {
///     // equivalent to: Result<Vec<u8>, AppError>
///     wav::load_as_mulaw(path, 8000)
/// }
/// ```
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(AppError::CodecFailure("odd".into()).is_recoverable());
        assert!(AppError::MalformedEnvelope("no event".into()).is_recoverable());
        assert!(!AppError::TransportFailure("closed".into()).is_recoverable());
        assert!(!AppError::ConfigError("bad".into()).is_recoverable());
    }

    #[test]
    fn test_json_error_becomes_malformed_envelope() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "malformed_envelope");
        assert!(err.to_string().starts_with("Malformed envelope:"));
    }

    #[test]
    fn test_wav_error_is_codec_failure() {
        let err: AppError = hound::WavReader::new(std::io::Cursor::new(b"not a wav".to_vec()))
            .err()
            .unwrap()
            .into();
        assert_eq!(err.kind(), "codec_failure");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_response_status() {
        let response = AppError::MalformedEnvelope("x".into()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let response = AppError::TransportFailure("x".into()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_GATEWAY);
    }
}
