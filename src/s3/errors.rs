//! S3 API Error Types
//!
//! Structured error handling for S3 REST operations.
//! Maps HTTP status codes to specific error variants for retry and health decisions.

use serde::Deserialize;

/// S3 API error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum S3Error {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    Parse(String),
}

/// `<Error>` document returned by S3 on failed requests
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl S3Error {
    /// Whether this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            S3Error::RateLimited(_)
                | S3Error::Timeout
                | S3Error::Network(_)
                | S3Error::Server(_, _)
        )
    }

    /// Create an S3Error from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = describe_body(body);
        match status {
            401 => S3Error::Unauthorized(detail),
            403 => S3Error::Forbidden(detail),
            404 => S3Error::NotFound(detail),
            408 => S3Error::Timeout,
            429 | 503 => S3Error::RateLimited(detail),
            500..=599 => S3Error::Server(status, detail),
            _ => S3Error::Request(format!("HTTP {}: {}", status, detail)),
        }
    }
}

impl From<reqwest::Error> for S3Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            S3Error::Timeout
        } else if e.is_connect() {
            S3Error::Network(e.to_string())
        } else if e.is_decode() {
            S3Error::Parse(e.to_string())
        } else {
            S3Error::Request(e.to_string())
        }
    }
}

/// Prefer "Code: Message" from an S3 XML error body, falling back to the raw text
fn describe_body(body: &str) -> String {
    match quick_xml::de::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.code.is_empty() => {
            if parsed.message.is_empty() {
                parsed.code
            } else {
                format!("{}: {}", parsed.code, parsed.message)
            }
        }
        _ => body.trim().to_string(),
    }
}
