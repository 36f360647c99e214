//! Sentiment analysis of a stored transcript.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use yj_models::VideoPatch;
use yj_queue::{Task, TaskName};
use yj_store::{patch_video, PatchOutcome};

use super::{entity_missing, mismatched, no_work, upstream_failed, TaskContext, TaskHandler, TaskOutcome};
use crate::error::WorkerResult;

/// Writes the sentiment field group of a video. A rerun overwrites the
/// previous result.
pub struct AnalyzeTranscriptHandler {
    ctx: Arc<TaskContext>,
}

impl AnalyzeTranscriptHandler {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for AnalyzeTranscriptHandler {
    fn name(&self) -> TaskName {
        TaskName::AnalyzeTranscript
    }

    async fn handle(&self, task: &Task) -> WorkerResult<TaskOutcome> {
        let Task::AnalyzeTranscript { video_key } = task else {
            return Err(mismatched(self.name(), task));
        };
        let ctx = &self.ctx;

        let Some(video) = ctx.store.get_video(video_key).await? else {
            return Ok(entity_missing("video", video_key.as_str()));
        };
        if !video.entity.can_be_analyzed() {
            return Ok(no_work(video_key.as_str(), "no transcript to analyze"));
        }

        let analysis = match ctx.sentiment.analyze_sentiment(&video.entity.transcript).await {
            Ok(analysis) => analysis,
            Err(e) => return Ok(upstream_failed("analyze_sentiment", video_key.as_str(), &e)),
        };
        let (score, magnitude) = (analysis.score(), analysis.magnitude());

        let patch = VideoPatch::Sentiment(analysis);
        if patch_video(ctx.store.as_ref(), video, &patch).await? == PatchOutcome::Missing {
            return Ok(entity_missing("video", video_key.as_str()));
        }

        info!(video_key = %video_key, score, magnitude, "Stored transcript sentiment");
        Ok(TaskOutcome::Completed)
    }
}
