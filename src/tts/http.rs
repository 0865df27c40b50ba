//! HTTP plumbing shared by the provider implementations.

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::error::{Result, TtsError};
use crate::config::TtsConfig;

/// Upstream error bodies are cut to this many chars.
const MAX_ERROR_CHARS: usize = 500;

/// Build a client with the configured connect and read timeouts.
pub(crate) fn build_client(config: &TtsConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.request_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TtsError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Send `request` and turn any non-2xx status into [`TtsError::Upstream`].
pub(crate) async fn send(provider: &'static str, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(request_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read {} error body for HTTP {}: {}", provider, status, e);
            String::new()
        }
    };
    Err(TtsError::Upstream { provider, status: status.as_u16(), message: error_message(&body) })
}

/// A request that could not even be built is a settings problem, not a retryable network failure.
fn request_error(err: reqwest::Error) -> TtsError {
    if err.is_builder() {
        return TtsError::Configuration(format!("invalid request: {}", err));
    }
    TtsError::Network(err)
}

/// Pull a readable message out of an error body, JSON or not.
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error", "detail"].iter().find_map(|key| match v.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_string),
            other => Some(other.to_string()),
        })
    });

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return "empty error body".to_string();
    }
    message.chars().take(MAX_ERROR_CHARS).collect()
}

/// Round for wire formatting so f32 noise does not leak into requests.
pub(crate) fn wire_number(value: f32) -> f64 {
    (value as f64 * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"message": "Invalid API key"}"#), "Invalid API key");
        assert_eq!(error_message(r#"{"error": {"message": "quota exceeded"}}"#), "quota exceeded");
        assert_eq!(error_message("  plain text failure \n"), "plain text failure");
        assert_eq!(error_message(""), "empty error body");
        assert_eq!(error_message(&"x".repeat(2000)).len(), MAX_ERROR_CHARS);
    }

    #[test]
    fn test_unbuildable_request_is_configuration_error() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let client = Client::new();
        let err = rt.block_on(send("unrealspeech", client.post("http://bad host:99999/stream"))).unwrap_err();
        assert!(matches!(err, TtsError::Configuration(_)), "unexpected error: {:?}", err);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_wire_number() {
        assert_eq!(wire_number(0.1), 0.1);
        assert_eq!(wire_number(-0.25), -0.25);
        assert_eq!(wire_number(1.0).to_string(), "1");
    }
}
