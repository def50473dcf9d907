//! Error types for the Zema domain.
//!
//! Uses `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// The top-level error type for all Zema operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the assistant could not be reached at all, as opposed to
    /// answering with something unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Provider(ProviderError::ServiceUnavailable(_) | ProviderError::Timeout(_))
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the local inference service.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Inference service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "model crashed".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("model crashed"));
    }

    #[test]
    fn unavailable_is_distinguishable_from_bad_answers() {
        let down = Error::from(ProviderError::ServiceUnavailable("connection refused".into()));
        let slow = Error::from(ProviderError::Timeout("health probe".into()));
        let garbled = Error::from(ProviderError::MalformedResponse("missing message".into()));

        assert!(down.is_unavailable());
        assert!(slow.is_unavailable());
        assert!(!garbled.is_unavailable());
    }
}
