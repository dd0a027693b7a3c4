//! Shared HTTP client, SSE parsing, and header utilities.

use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::LoopError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// No overall request timeout: completion streams stay open for as long as
/// the model keeps producing output.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_default()
    })
}

/// Build Anthropic-style headers (x-api-key).
pub fn anthropic_headers(api_key: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(api_key) {
        headers.insert("x-api-key", val);
    }
    if let Ok(val) = HeaderValue::from_str(version) {
        headers.insert("anthropic-version", val);
    }
    headers
}

/// Parse an SSE "data:" line, returning None for "[DONE]".
pub fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line
        .strip_prefix("data:")
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))?;
    if data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> LoopError {
    match status {
        401 | 403 => LoopError::Authentication(extract_message(body)),
        429 => LoopError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => LoopError::api(status, extract_message(body)),
    }
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
