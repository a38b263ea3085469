//! Error types for the Gemini client

use std::fmt;

/// Errors that can occur when calling the Gemini API
#[derive(Debug)]
pub enum GeminiError {
    /// HTTP request failed or the body could not be decoded
    Http(reqwest::Error),
    /// The API answered with a non-success status
    Api { status: u16, message: String },
    /// The prompt was blocked before any candidate was generated
    Blocked(String),
    /// The model returned no text
    EmptyResponse,
}

impl fmt::Display for GeminiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "Gemini HTTP error: {}", e),
            Self::Api { status, message } => {
                write!(f, "Gemini API error ({}): {}", status, message)
            }
            Self::Blocked(reason) => write!(f, "Gemini blocked the prompt: {}", reason),
            Self::EmptyResponse => write!(f, "Gemini returned an empty response"),
        }
    }
}

impl std::error::Error for GeminiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

/// Result type for Gemini API operations
pub type Result<T> = std::result::Result<T, GeminiError>;
