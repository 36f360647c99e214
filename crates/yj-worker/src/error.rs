//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] yj_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] yj_queue::QueueError),

    #[error("Media error: {0}")]
    Media(#[from] yj_youtube::MediaError),

    #[error("Sentiment error: {0}")]
    Sentiment(#[from] yj_language::SentimentError),
}

impl WorkerError {
    pub fn unknown_task(name: impl Into<String>) -> Self {
        Self::UnknownTask(name.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the queue should redeliver a task that failed with this error.
    ///
    /// Persistence failures always are. Queue failures are when the transport
    /// may recover, since a follow-up task that never got enqueued is lost
    /// otherwise.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Store(_) => true,
            WorkerError::Queue(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yj_queue::QueueError;
    use yj_store::StoreError;

    #[test]
    fn test_persistence_failures_are_retryable() {
        assert!(WorkerError::from(StoreError::unavailable("down")).is_retryable());
        assert!(WorkerError::from(StoreError::Contention("videos/v1".into())).is_retryable());
    }

    #[test]
    fn test_other_failures_are_final() {
        assert!(!WorkerError::unknown_task("nope").is_retryable());
        assert!(!WorkerError::validation("title too long").is_retryable());
        assert!(!WorkerError::from(QueueError::MalformedPayload("x".into())).is_retryable());
        assert!(WorkerError::from(QueueError::enqueue_failed("timeout")).is_retryable());
    }
}
