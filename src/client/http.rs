//! Shared HTTP client and SSE parsing utilities.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::DroverError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall request timeout here: streamed completions are bounded by the
/// reason stage's own wall-clock and idle budgets.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Build default headers for a Bearer-token API.
pub fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Map an HTTP error status onto the error taxonomy.
pub fn status_to_error(status: u16, body: &str) -> DroverError {
    DroverError::api(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_lines_are_unwrapped() {
        assert_eq!(parse_sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(parse_sse_data("data: [DONE]"), None);
        assert_eq!(parse_sse_data(": heartbeat"), None);
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(status_to_error(503, "overloaded").is_retryable());
        assert!(status_to_error(429, "slow down").is_retryable());
        assert!(!status_to_error(400, "bad request").is_retryable());
    }
}
