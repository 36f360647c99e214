//! Import the caption transcript of a video.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use yj_models::{Video, VideoPatch};
use yj_queue::{QueueName, Task, TaskName};
use yj_store::{patch_video, PatchOutcome, Versioned};

use super::{entity_missing, mismatched, no_work, upstream_failed, TaskContext, TaskHandler, TaskOutcome};
use crate::error::WorkerResult;

/// Stores the transcript and queues its analysis. Videos without captions
/// are the common case, not an error: they are flagged and left alone.
pub struct ImportTranscriptHandler {
    ctx: Arc<TaskContext>,
}

impl ImportTranscriptHandler {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// Flag a video that still has no transcript as failed.
    async fn give_up(&self, video: Versioned<Video>, outcome: TaskOutcome) -> WorkerResult<TaskOutcome> {
        if video.entity.can_be_analyzed() {
            // Imported by an earlier delivery
            return Ok(outcome);
        }
        let key = video.entity.key.clone();
        match patch_video(self.ctx.store.as_ref(), video, &VideoPatch::TranscriptFailed).await? {
            PatchOutcome::Missing => Ok(entity_missing("video", key.as_str())),
            PatchOutcome::Applied(_) => Ok(outcome),
        }
    }
}

#[async_trait]
impl TaskHandler for ImportTranscriptHandler {
    fn name(&self) -> TaskName {
        TaskName::ImportTranscript
    }

    async fn handle(&self, task: &Task) -> WorkerResult<TaskOutcome> {
        let Task::ImportTranscript { video_key } = task else {
            return Err(mismatched(self.name(), task));
        };
        let ctx = &self.ctx;

        let Some(video) = ctx.store.get_video(video_key).await? else {
            return Ok(entity_missing("video", video_key.as_str()));
        };

        let fetched = ctx.media.get_transcript(&video.entity.external_id).await;
        let transcript = match fetched {
            Ok(transcript) => transcript,
            Err(e) => {
                let outcome = upstream_failed("get_transcript", video_key.as_str(), &e);
                return self.give_up(video, outcome).await;
            }
        };
        let Some(patch) = transcript.and_then(VideoPatch::transcript) else {
            let outcome = no_work(video_key.as_str(), "no transcript available");
            return self.give_up(video, outcome).await;
        };

        if patch_video(ctx.store.as_ref(), video, &patch).await? == PatchOutcome::Missing {
            return Ok(entity_missing("video", video_key.as_str()));
        }
        info!(video_key = %video_key, "Stored transcript");

        ctx.enqueue(
            QueueName::Analyze,
            Task::AnalyzeTranscript {
                video_key: video_key.clone(),
            },
        )
        .await?;
        Ok(TaskOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Harness;
    use crate::handlers::SkipReason;
    use chrono::Utc;
    use yj_language::MockSentimentClient;
    use yj_models::{NewVideo, TranscriptStage, VideoKey};
    use yj_store::EntityStore;
    use yj_youtube::{MediaError, MockMediaClient};

    async fn stored_video(harness: &Harness) -> Video {
        let video = Video::from_new(VideoKey::new(), NewVideo::new("video1234", "Video", Utc::now()));
        harness.store.create_video(&video).await.unwrap().entity
    }

    fn task(video: &Video) -> Task {
        Task::ImportTranscript {
            video_key: video.key.clone(),
        }
    }

    fn media_returning(transcript: Option<&'static str>) -> MockMediaClient {
        let mut media = MockMediaClient::new();
        media
            .expect_get_transcript()
            .withf(|id| id == "video1234")
            .returning(move |_| Ok(transcript.map(str::to_string)));
        media
    }

    #[tokio::test]
    async fn test_stores_transcript_and_queues_analysis() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;
        let handler = ImportTranscriptHandler::new(harness.context(
            media_returning(Some("Is this thing on? Hello world")),
            MockSentimentClient::new(),
        ));

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let stored = harness.store.get_video(&video.key).await.unwrap().unwrap();
        assert_eq!(stored.entity.transcript, "Is this thing on? Hello world");
        assert!(stored.entity.can_be_analyzed());
        assert_eq!(
            harness.queue.pending(QueueName::Analyze),
            vec![Task::AnalyzeTranscript {
                video_key: video.key.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_captions_marks_transcript_failed() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;
        let handler = ImportTranscriptHandler::new(
            harness.context(media_returning(None), MockSentimentClient::new()),
        );

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::NoWork));
        assert!(harness.queue.history().is_empty());

        let stored = harness.store.get_video(&video.key).await.unwrap().unwrap().entity;
        assert!(stored.transcript_failed);
        assert_eq!(stored.transcript_stage(), TranscriptStage::Failed);
    }

    #[tokio::test]
    async fn test_blank_transcript_is_not_written() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;
        let handler = ImportTranscriptHandler::new(
            harness.context(media_returning(Some("  \n ")), MockSentimentClient::new()),
        );

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::NoWork));

        let stored = harness.store.get_video(&video.key).await.unwrap().unwrap().entity;
        assert_eq!(stored.transcript, "");
        assert!(stored.transcript_failed);
    }

    #[tokio::test]
    async fn test_late_failure_does_not_flag_imported_transcript() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;
        let handler = ImportTranscriptHandler::new(
            harness.context(media_returning(Some("hello")), MockSentimentClient::new()),
        );
        handler.handle(&task(&video)).await.unwrap();
        let writes = harness.store.write_count();

        // Redelivered, and captions have since been removed
        let handler = ImportTranscriptHandler::new(
            harness.context(media_returning(None), MockSentimentClient::new()),
        );
        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::NoWork));
        assert_eq!(harness.store.write_count(), writes);

        let stored = harness.store.get_video(&video.key).await.unwrap().unwrap().entity;
        assert_eq!(stored.transcript, "hello");
        assert!(!stored.transcript_failed);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_swallowed() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;

        let mut media = MockMediaClient::new();
        media
            .expect_get_transcript()
            .returning(|_| Err(MediaError::ServiceUnavailable("503".into())));
        let handler = ImportTranscriptHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::UpstreamFailed));
        assert!(harness.queue.history().is_empty());

        let stored = harness.store.get_video(&video.key).await.unwrap().unwrap().entity;
        assert_eq!(stored.transcript_stage(), TranscriptStage::Failed);
    }

    #[tokio::test]
    async fn test_missing_video_has_no_side_effects() {
        let harness = Harness::new();
        let mut media = MockMediaClient::new();
        media.expect_get_transcript().never();
        let handler = ImportTranscriptHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler
            .handle(&Task::ImportTranscript {
                video_key: VideoKey::from("gone"),
            })
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::EntityMissing));
        assert_eq!(harness.store.write_count(), 0);
        assert!(harness.queue.history().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let harness = Harness::new();
        let video = stored_video(&harness).await;
        harness.store.set_fail_writes(true);
        let handler = ImportTranscriptHandler::new(
            harness.context(media_returning(Some("hello")), MockSentimentClient::new()),
        );

        let err = handler.handle(&task(&video)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(harness.queue.history().is_empty());
    }
}
