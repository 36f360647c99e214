//! Structured task logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use yj_queue::{TaskEnvelope, TaskId, TaskName};

/// Install the global subscriber: JSON lines when `LOG_FORMAT=json`,
/// coloured text otherwise. `RUST_LOG` directives are added on top of
/// `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => env_filter = env_filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log directive {:?}: {}", default_directive, e),
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Lifecycle logging for one task delivery, with `task_id`, `task` and
/// `attempt` on every line.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_id: String,
    task: TaskName,
    attempt: u32,
}

impl TaskLogger {
    pub fn new(task_id: &TaskId, task: TaskName, attempt: u32) -> Self {
        Self {
            task_id: task_id.to_string(),
            task,
            attempt,
        }
    }

    pub fn for_envelope(envelope: &TaskEnvelope) -> Self {
        Self::new(&envelope.id, envelope.task.name(), envelope.attempt)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt,
            "Task started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt,
            "Task progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt,
            "Task completed: {}", message
        );
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn task(&self) -> TaskName {
        self.task
    }

    /// Span wrapping the handler, so handler logs carry the task fields too.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_id = %self.task_id,
            task = %self.task,
            attempt = self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yj_models::VideoKey;
    use yj_queue::{QueueName, Task};

    #[test]
    fn test_task_logger_creation() {
        let task_id = TaskId::new();
        let logger = TaskLogger::new(&task_id, TaskName::AnalyzeComment, 1);

        assert_eq!(logger.task_id(), task_id.to_string());
        assert_eq!(logger.task(), TaskName::AnalyzeComment);
    }

    #[test]
    fn test_task_logger_from_envelope() {
        let envelope = TaskEnvelope::new(
            QueueName::Videos,
            Task::ImportTranscript {
                video_key: VideoKey::from("v1"),
            },
        );
        let logger = TaskLogger::for_envelope(&envelope);

        assert_eq!(logger.task_id(), envelope.id.as_str());
        assert_eq!(logger.task(), TaskName::ImportTranscript);
    }
}
