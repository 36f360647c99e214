//! Worker configuration.

use std::time::Duration;

use yj_queue::RetryPolicy;
use yj_youtube::{CommentOrder, CommentQuery};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum tasks executing at once
    pub max_concurrent_tasks: usize,
    /// Maximum tasks taken from the broker per fetch
    pub fetch_batch: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often delayed retries are released and stale tasks reclaimed
    pub recovery_interval: Duration,
    /// Redelivery policy for failed tasks
    pub retry: RetryPolicy,
    /// Comment threads fetched per video
    pub comment_query: CommentQuery,
    /// Port for the Prometheus exporter; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            fetch_batch: 5,
            shutdown_timeout: Duration::from_secs(30),
            recovery_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            comment_query: CommentQuery::default(),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_tasks: std::env::var("WORKER_MAX_TASKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_tasks),
            fetch_batch: std::env::var("WORKER_FETCH_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_batch),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            recovery_interval: Duration::from_secs(
                std::env::var("WORKER_RECOVERY_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            retry: RetryPolicy::from_env(),
            comment_query: CommentQuery {
                max_results: std::env::var("COMMENTS_MAX_RESULTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.comment_query.max_results),
                order: match std::env::var("COMMENTS_ORDER").as_deref() {
                    Ok("time") => CommentOrder::Time,
                    _ => CommentOrder::Relevance,
                },
            },
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the executor cannot make progress with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(WorkerError::config_error("WORKER_MAX_TASKS must be at least 1"));
        }
        if self.fetch_batch == 0 {
            return Err(WorkerError::config_error("WORKER_FETCH_BATCH must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(WorkerError::config_error("TASK_MAX_ATTEMPTS must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("WORKER_MAX_TASKS", "3");
        std::env::set_var("COMMENTS_ORDER", "time");
        std::env::set_var("TASK_MAX_ATTEMPTS", "4");
        std::env::remove_var("METRICS_PORT");

        let config = WorkerConfig::from_env().unwrap();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.comment_query.order, CommentOrder::Time);
        assert_eq!(config.comment_query.max_results, 100);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.metrics_port, None);

        std::env::remove_var("WORKER_MAX_TASKS");
        std::env::remove_var("COMMENTS_ORDER");
        std::env::remove_var("TASK_MAX_ATTEMPTS");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_concurrency() {
        std::env::set_var("WORKER_MAX_TASKS", "0");
        let err = WorkerConfig::from_env().unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
        std::env::remove_var("WORKER_MAX_TASKS");

        std::env::set_var("WORKER_FETCH_BATCH", "0");
        assert!(WorkerConfig::from_env().is_err());
        std::env::remove_var("WORKER_FETCH_BATCH");

        assert!(WorkerConfig::from_env().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = WorkerConfig {
            retry: RetryPolicy::immediate(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(WorkerConfig::default().validate().is_ok());
    }
}
