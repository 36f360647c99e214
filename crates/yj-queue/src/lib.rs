//! Named task queues with at-least-once delivery.
//!
//! This crate provides:
//! - Typed task payloads routed to the `comments`, `videos` and `analyze` queues
//! - Producer and consumer interfaces
//! - A Redis Streams broker with delayed retries and dead-letter streams
//! - An in-process broker for tests
//! - The redelivery policy

pub mod error;
pub mod memory;
pub mod queue;
pub mod retry;
pub mod streams;
pub mod task;

pub use error::{QueueError, QueueResult};
pub use memory::{DeadLetter, MemoryQueue};
pub use queue::{Delivery, TaskBroker, TaskQueue};
pub use retry::RetryPolicy;
pub use streams::{QueueConfig, RedisTaskQueue};
pub use task::{QueueName, Task, TaskEnvelope, TaskId, TaskName};

#[cfg(any(test, feature = "mock"))]
pub use queue::MockTaskQueue;
