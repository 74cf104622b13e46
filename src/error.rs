//! Transport error taxonomy for marketplace page requests

use thiserror::Error;

/// Why a single page request failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// HTTP 429 from the marketplace
    #[error("rate limited by marketplace")]
    RateLimited,

    /// Any other non-success HTTP status
    #[error("HTTP error {0}")]
    Http(u16),

    /// The request did not complete within the per-call timeout
    #[error("request timed out")]
    Timeout,

    /// Connection reset, DNS failure, TLS error...
    #[error("transport error: {0}")]
    Transport(String),

    /// The body was not a valid search response
    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether another attempt at the same page may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited
            | FetchError::Timeout
            | FetchError::Transport(_)
            | FetchError::Decode(_) => true,
            FetchError::Http(code) => *code >= 500 || *code == 408,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RateLimited => "rate_limited",
            FetchError::Http(_) => "http",
            FetchError::Timeout => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                FetchError::RateLimited
            } else {
                FetchError::Http(status.as_u16())
            }
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}
