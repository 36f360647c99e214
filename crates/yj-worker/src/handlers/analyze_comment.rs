//! Sentiment analysis of a stored comment.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use yj_models::{CommentPatch, VideoComment};
use yj_queue::{Task, TaskName};
use yj_store::{patch_comment, PatchOutcome, Versioned};

use super::{entity_missing, mismatched, no_work, upstream_failed, TaskContext, TaskHandler, TaskOutcome};
use crate::error::WorkerResult;

pub struct AnalyzeCommentHandler {
    ctx: Arc<TaskContext>,
}

impl AnalyzeCommentHandler {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// Flag the comment as one that will not get a sentiment result.
    async fn give_up(
        &self,
        comment: Versioned<VideoComment>,
        outcome: TaskOutcome,
    ) -> WorkerResult<TaskOutcome> {
        let key = comment.entity.key.clone();
        match patch_comment(self.ctx.store.as_ref(), comment, &CommentPatch::AnalysisFailed).await? {
            PatchOutcome::Missing => Ok(entity_missing("comment", key.as_str())),
            PatchOutcome::Applied(_) => Ok(outcome),
        }
    }
}

#[async_trait]
impl TaskHandler for AnalyzeCommentHandler {
    fn name(&self) -> TaskName {
        TaskName::AnalyzeComment
    }

    async fn handle(&self, task: &Task) -> WorkerResult<TaskOutcome> {
        let Task::AnalyzeComment { comment_key } = task else {
            return Err(mismatched(self.name(), task));
        };
        let ctx = &self.ctx;

        let Some(comment) = ctx.store.get_comment(comment_key).await? else {
            return Ok(entity_missing("comment", comment_key.as_str()));
        };
        if comment.entity.comment_raw.is_empty() {
            let outcome = no_work(comment_key.as_str(), "empty comment text");
            return self.give_up(comment, outcome).await;
        }

        let analyzed = ctx.sentiment.analyze_sentiment(&comment.entity.comment_raw).await;
        let analysis = match analyzed {
            Ok(analysis) => analysis,
            Err(e) => {
                let outcome = upstream_failed("analyze_sentiment", comment_key.as_str(), &e);
                return self.give_up(comment, outcome).await;
            }
        };
        let (score, magnitude) = (analysis.score(), analysis.magnitude());

        let patch = CommentPatch::Sentiment(analysis);
        if patch_comment(ctx.store.as_ref(), comment, &patch).await? == PatchOutcome::Missing {
            return Ok(entity_missing("comment", comment_key.as_str()));
        }

        info!(comment_key = %comment_key, score, magnitude, "Stored comment sentiment");
        Ok(TaskOutcome::Completed)
    }
}
