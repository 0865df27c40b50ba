//! Error taxonomy for speech synthesis calls.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by providers, the stream bridge and the synthesis service.
#[derive(Error, Debug)]
pub enum TtsError {
    /// Bad caller input (text or voice). No network call was attempted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The provider answered with a non-2xx status or an unusable payload.
    #[error("{provider} returned HTTP {status}: {message}")]
    Upstream { provider: &'static str, status: u16, message: String },

    /// Connection, TLS or read failure talking to the provider.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No stream event arrived within the per-item wait budget.
    #[error("no audio received within {waited:?}")]
    Timeout { waited: Duration },

    /// Missing credentials, unknown provider or invalid settings. Raised at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The stream worker went away without reporting completion or failure.
    #[error("stream worker exited before the stream finished")]
    WorkerLost,

    /// The caller cancelled the stream before it finished.
    #[error("stream cancelled")]
    Cancelled,
}

impl TtsError {
    /// Whether a caller may reasonably retry the same request with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, TtsError::Network(_) | TtsError::Timeout { .. } | TtsError::WorkerLost)
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        TtsError::Validation(reason.into())
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        TtsError::Configuration(reason.into())
    }
}

/// Result alias used across the synthesis stack.
pub type Result<T, E = TtsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TtsError::Timeout { waited: Duration::from_secs(30) }.is_transient());
        assert!(TtsError::WorkerLost.is_transient());
        assert!(!TtsError::validation("empty").is_transient());
        assert!(!TtsError::configuration("missing key").is_transient());
        assert!(!TtsError::Cancelled.is_transient());
        let upstream = TtsError::Upstream { provider: "unrealspeech", status: 401, message: "bad key".into() };
        assert!(!upstream.is_transient());
    }

    #[test]
    fn test_upstream_message_includes_status() {
        let err = TtsError::Upstream { provider: "hume", status: 422, message: "voice not found".into() };
        assert_eq!(err.to_string(), "hume returned HTTP 422: voice not found");
    }
}
