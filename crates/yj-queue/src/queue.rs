//! Queue interfaces.
//!
//! [`TaskQueue`] is the producer side used by the trigger and by handlers
//! fanning out follow-up work. [`TaskBroker`] is the consumer side used by
//! the executor.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueResult;
use crate::task::{QueueName, Task, TaskEnvelope, TaskId};

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `task` onto `queue`. Returns once the task is durably accepted.
    async fn enqueue(&self, queue: QueueName, task: Task) -> QueueResult<TaskId>;
}

/// A task handed to a consumer, with whatever the broker needs to settle it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub receipt: String,
    pub envelope: TaskEnvelope,
}

#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Take up to `max` tasks that are due, across all queues.
    async fn fetch(&self, consumer: &str, max: usize) -> QueueResult<Vec<Delivery>>;

    /// The task finished; forget it.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Schedule the next attempt after `delay` and settle this one.
    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str) -> QueueResult<()>;

    /// Move the task to its queue's dead-letter list and settle it.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Housekeeping: release due retries and reclaim work abandoned by
    /// crashed consumers. Returns how many tasks were made available again.
    async fn recover(&self, _consumer: &str) -> QueueResult<usize> {
        Ok(0)
    }
}
