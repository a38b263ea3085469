//! Error taxonomy shown to the user, plus the HTTP and startup error types

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use ts_rs::TS;

use crate::config::ConfigError;
use crate::geocoding::GeocodingError;
use crate::rainfall::RainfallError;

pub const INVALID_COORDINATES_MESSAGE: &str =
    "Invalid coordinates. Please enter a valid latitude (-90 to 90) and longitude (-180 to 180).";
pub const MISSING_ADDRESS_MESSAGE: &str = "Please enter a U.S. address.";
pub const GEOCODING_FAILURE_MESSAGE: &str =
    "Failed to find coordinates for the address. Please check the address and try again.";
pub const RETRIEVAL_FAILURE_MESSAGE: &str = "Failed to get valid data from the AI model.";
pub const UNEXPECTED_FAILURE_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Closed set of failure classes; presentation dispatches on this, never on message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Bad user input, caught before any network call
    Validation,
    /// Address could not be resolved
    Geocoding,
    /// Rainfall oracle failed or returned malformed data
    Retrieval,
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Geocoding => "geocoding",
            Self::Retrieval => "retrieval",
            Self::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// A failed retrieval attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: ErrorKind,
    /// Diagnostic detail; see [`Failure::user_message`] for what to display
    pub message: String,
}

impl Failure {
    pub fn validation(message: &str) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.to_string(),
        }
    }

    pub fn geocoding(err: &GeocodingError) -> Self {
        Self {
            kind: ErrorKind::Geocoding,
            message: err.to_string(),
        }
    }

    pub fn retrieval(err: &RainfallError) -> Self {
        Self {
            kind: ErrorKind::Retrieval,
            message: err.to_string(),
        }
    }

    pub fn unexpected(message: &str) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            message: message.to_string(),
        }
    }

    /// The single human-readable line for the error banner
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::Geocoding => GEOCODING_FAILURE_MESSAGE.to_string(),
            ErrorKind::Retrieval => RETRIEVAL_FAILURE_MESSAGE.to_string(),
            ErrorKind::Unexpected if self.message.trim().is_empty() => {
                UNEXPECTED_FAILURE_MESSAGE.to_string()
            }
            ErrorKind::Unexpected => self.message.clone(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// HTTP API error that converts to a JSON response
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

/// Errors that stop the binary before or while serving
#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Logging(String),
    Server(std::io::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "Configuration error: {}", e),
            StartupError::Logging(msg) => write!(f, "Logging setup error: {}", msg),
            StartupError::Server(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Config(e) => Some(e),
            StartupError::Server(e) => Some(e),
            StartupError::Logging(_) => None,
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(err: ConfigError) -> Self {
        StartupError::Config(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for StartupError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        StartupError::Logging(err.to_string())
    }
}

impl From<std::io::Error> for StartupError {
    fn from(err: std::io::Error) -> Self {
        StartupError::Server(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocoding_message_ignores_detail() {
        let failure = Failure::geocoding(&GeocodingError::NotFound);
        assert_eq!(failure.kind, ErrorKind::Geocoding);
        assert_eq!(failure.user_message(), GEOCODING_FAILURE_MESSAGE);
    }

    #[test]
    fn test_classification_does_not_read_message_text() {
        // A retrieval failure whose detail mentions geocoding stays a retrieval failure
        let failure = Failure::retrieval(&RainfallError::Oracle(
            "upstream geocoding proxy timed out".to_string(),
        ));
        assert_eq!(failure.kind, ErrorKind::Retrieval);
        assert_eq!(failure.user_message(), RETRIEVAL_FAILURE_MESSAGE);
    }

    #[test]
    fn test_validation_message_passes_through() {
        let failure = Failure::validation(MISSING_ADDRESS_MESSAGE);
        assert_eq!(failure.user_message(), "Please enter a U.S. address.");
    }

    #[test]
    fn test_unexpected_falls_back_when_empty() {
        assert_eq!(
            Failure::unexpected("").user_message(),
            UNEXPECTED_FAILURE_MESSAGE
        );
        assert_eq!(
            Failure::unexpected("worker panicked").user_message(),
            "worker panicked"
        );
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::validation(INVALID_COORDINATES_MESSAGE);
        assert!(failure.to_string().starts_with("validation error: Invalid coordinates."));
    }

    #[test]
    fn test_error_kind_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(ErrorKind::Geocoding).unwrap(),
            serde_json::json!("geocoding")
        );
    }

    #[test]
    fn test_startup_error_display() {
        let err = StartupError::Logging("bad directive".to_string());
        assert_eq!(err.to_string(), "Logging setup error: bad directive");
    }
}
