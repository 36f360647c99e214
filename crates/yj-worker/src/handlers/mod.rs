//! Task handlers and the registry that looks them up by task name.
//!
//! Every handler follows the same failure policy:
//! - a target entity that no longer exists ends the task successfully
//! - a failing media or sentiment call is logged and ends the task successfully
//! - a store error (and a failed follow-up enqueue) propagates, so the queue
//!   redelivers the task
//! - nothing to do is a quiet success

mod analyze_comment;
mod analyze_transcript;
mod import_comments;
mod import_transcript;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use yj_language::SentimentClient;
use yj_queue::{QueueName, Task, TaskId, TaskName, TaskQueue};
use yj_store::EntityStore;
use yj_youtube::{CommentQuery, MediaClient};

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

pub use analyze_comment::AnalyzeCommentHandler;
pub use analyze_transcript::AnalyzeTranscriptHandler;
pub use import_comments::ImportCommentsHandler;
pub use import_transcript::ImportTranscriptHandler;

/// Why a task ended without doing its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The video or comment is gone.
    EntityMissing,
    /// The media platform or sentiment service failed.
    UpstreamFailed,
    /// Nothing to import or analyze.
    NoWork,
}

/// How a handler run ended. Both variants are successes to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Skipped(SkipReason),
}

impl TaskOutcome {
    /// Label used for the outcome metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Skipped(SkipReason::EntityMissing) => "not_found",
            TaskOutcome::Skipped(SkipReason::UpstreamFailed) => "upstream_failed",
            TaskOutcome::Skipped(SkipReason::NoWork) => "no_work",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators shared by all handlers.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn EntityStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub media: Arc<dyn MediaClient>,
    pub sentiment: Arc<dyn SentimentClient>,
    pub comment_query: CommentQuery,
}

impl TaskContext {
    pub fn new(
        store: Arc<dyn EntityStore>,
        queue: Arc<dyn TaskQueue>,
        media: Arc<dyn MediaClient>,
        sentiment: Arc<dyn SentimentClient>,
    ) -> Self {
        Self {
            store,
            queue,
            media,
            sentiment,
            comment_query: CommentQuery::default(),
        }
    }

    pub fn with_comment_query(mut self, query: CommentQuery) -> Self {
        self.comment_query = query;
        self
    }

    /// Enqueue a follow-up task. Failure propagates so the current task is redelivered.
    pub async fn enqueue(&self, queue: QueueName, task: Task) -> WorkerResult<TaskId> {
        let name = task.name();
        match self.queue.enqueue(queue, task).await {
            Ok(id) => {
                metrics::record_enqueued(queue, name);
                debug!(queue = %queue, task = %name, task_id = %id, "Enqueued follow-up task");
                Ok(id)
            }
            Err(e) => {
                metrics::record_enqueue_failure(queue, name);
                Err(e.into())
            }
        }
    }
}

/// Handles one kind of task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> TaskName;

    async fn handle(&self, task: &Task) -> WorkerResult<TaskOutcome>;
}

/// Handlers by task name, built once at startup.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    handlers: HashMap<TaskName, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four pipeline handlers.
    pub fn standard(ctx: Arc<TaskContext>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ImportCommentsHandler::new(Arc::clone(&ctx))));
        registry.register(Arc::new(ImportTranscriptHandler::new(Arc::clone(&ctx))));
        registry.register(Arc::new(AnalyzeTranscriptHandler::new(Arc::clone(&ctx))));
        registry.register(Arc::new(AnalyzeCommentHandler::new(ctx)));
        registry
    }

    /// Register a handler under its name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn get(&self, name: TaskName) -> WorkerResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&name)
            .cloned()
            .ok_or_else(|| WorkerError::unknown_task(name.as_str()))
    }

    pub fn contains(&self, name: TaskName) -> bool {
        self.handlers.contains_key(&name)
    }

    /// Run `task` on the handler registered for its name.
    pub async fn dispatch(&self, task: &Task) -> WorkerResult<TaskOutcome> {
        self.get(task.name())?.handle(task).await
    }
}

/// Error for a task routed to the wrong handler.
fn mismatched(handler: TaskName, task: &Task) -> WorkerError {
    WorkerError::unknown_task(format!("{} handler got {}", handler, task.name()))
}

fn entity_missing(kind: &str, key: &str) -> TaskOutcome {
    info!(kind, key, "Entity no longer exists, nothing to do");
    TaskOutcome::Skipped(SkipReason::EntityMissing)
}

fn upstream_failed(call: &str, key: &str, err: &dyn std::error::Error) -> TaskOutcome {
    error!(call, key, error = %err, "Upstream call failed, abandoning task");
    TaskOutcome::Skipped(SkipReason::UpstreamFailed)
}

fn no_work(key: &str, reason: &str) -> TaskOutcome {
    debug!(key, reason, "Nothing to do");
    TaskOutcome::Skipped(SkipReason::NoWork)
}
