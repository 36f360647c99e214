//! Sentiment client error types.

use thiserror::Error;

pub type SentimentResult<T> = Result<T, SentimentError>;

#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("Language service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limited by language service")]
    RateLimited,

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SentimentError {
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServiceUnavailable(format!(
                "Language service returned {}: {}",
                status, body
            )),
            _ => Self::RequestFailed(format!("Language service returned {}: {}", status, body)),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SentimentError::ServiceUnavailable(_)
                | SentimentError::RateLimited
                | SentimentError::Network(_)
        )
    }
}
