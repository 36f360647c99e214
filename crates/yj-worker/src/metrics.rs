//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use yj_queue::{QueueName, TaskName};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    /// Tasks finished by task name and outcome.
    pub const TASKS_PROCESSED_TOTAL: &str = "yj_tasks_processed_total";

    /// Handler run time in seconds by task name.
    pub const TASK_DURATION_SECONDS: &str = "yj_task_duration_seconds";

    /// Tasks enqueued by queue and task name.
    pub const TASKS_ENQUEUED_TOTAL: &str = "yj_tasks_enqueued_total";

    /// Enqueues that the queue rejected.
    pub const ENQUEUE_FAILURES_TOTAL: &str = "yj_enqueue_failures_total";

    /// Failed tasks scheduled for another attempt.
    pub const RETRIES_SCHEDULED_TOTAL: &str = "yj_task_retries_scheduled_total";

    /// Tasks moved to a dead-letter stream.
    pub const DEAD_LETTERS_TOTAL: &str = "yj_task_dead_letters_total";
}

/// Serve Prometheus metrics on `0.0.0.0:port`. Needs a running tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Record a finished task.
pub fn record_task(task: TaskName, outcome: &'static str, duration_secs: f64) {
    counter!(
        names::TASKS_PROCESSED_TOTAL,
        "task" => task.as_str(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(names::TASK_DURATION_SECONDS, "task" => task.as_str()).record(duration_secs);
}

/// Record an accepted enqueue.
pub fn record_enqueued(queue: QueueName, task: TaskName) {
    counter!(
        names::TASKS_ENQUEUED_TOTAL,
        "queue" => queue.as_str(),
        "task" => task.as_str()
    )
    .increment(1);
}

/// Record a rejected enqueue.
pub fn record_enqueue_failure(queue: QueueName, task: TaskName) {
    counter!(
        names::ENQUEUE_FAILURES_TOTAL,
        "queue" => queue.as_str(),
        "task" => task.as_str()
    )
    .increment(1);
}

pub fn record_retry_scheduled(task: TaskName) {
    counter!(names::RETRIES_SCHEDULED_TOTAL, "task" => task.as_str()).increment(1);
}

pub fn record_dead_letter(task: TaskName) {
    counter!(names::DEAD_LETTERS_TOTAL, "task" => task.as_str()).increment(1);
}
