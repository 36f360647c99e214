//! Import the top-level comments of a video and queue each for analysis.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use yj_queue::{QueueName, Task, TaskName};
use yj_store::CreateOutcome;

use super::{entity_missing, mismatched, no_work, upstream_failed, TaskContext, TaskHandler, TaskOutcome};
use crate::error::WorkerResult;

/// Comments are created keyed by `(video, external id)`, so a redelivered
/// import finds the rows it already wrote instead of duplicating them. Those
/// still unanalyzed are queued for analysis again, since the first run may
/// have failed between the create and the enqueue.
pub struct ImportCommentsHandler {
    ctx: Arc<TaskContext>,
}

impl ImportCommentsHandler {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for ImportCommentsHandler {
    fn name(&self) -> TaskName {
        TaskName::ImportComments
    }

    async fn handle(&self, task: &Task) -> WorkerResult<TaskOutcome> {
        let Task::ImportComments { video_key } = task else {
            return Err(mismatched(self.name(), task));
        };
        let ctx = &self.ctx;

        let Some(video) = ctx.store.get_video(video_key).await? else {
            return Ok(entity_missing("video", video_key.as_str()));
        };
        let video = video.entity;

        let threads = match ctx
            .media
            .get_comments(&video.external_id, ctx.comment_query)
            .await
        {
            Ok(threads) => threads,
            Err(e) => return Ok(upstream_failed("get_comments", video_key.as_str(), &e)),
        };
        if threads.is_empty() {
            return Ok(no_work(video_key.as_str(), "no comments returned"));
        }

        let mut seen = HashSet::new();
        let mut created = 0usize;
        let mut queued = 0usize;

        for thread in &threads {
            let comment = thread.to_video_comment(&video.key);
            if !seen.insert(comment.key.clone()) {
                continue;
            }

            let stored = match ctx.store.create_comment(&comment).await? {
                CreateOutcome::Created(stored) => {
                    created += 1;
                    stored
                }
                CreateOutcome::Existing(stored) if stored.entity.analysis_complete() => continue,
                CreateOutcome::Existing(stored) => stored,
            };

            ctx.enqueue(
                QueueName::Analyze,
                Task::AnalyzeComment {
                    comment_key: stored.entity.key,
                },
            )
            .await?;
            queued += 1;
        }

        info!(
            video_key = %video.key,
            fetched = threads.len(),
            created,
            queued,
            "Imported comments"
        );
        Ok(TaskOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::Harness;
    use crate::handlers::SkipReason;
    use chrono::Utc;
    use serde_json::json;
    use yj_language::MockSentimentClient;
    use yj_models::{CommentKey, NewVideo, Sentiment, SentimentAnalysis, Video, VideoKey};
    use yj_store::EntityStore;
    use yj_youtube::{CommentThread, MediaError, MockMediaClient};

    fn thread(id: &str) -> CommentThread {
        serde_json::from_value(json!({
            "id": format!("thread-{id}"),
            "snippet": {
                "topLevelComment": {
                    "id": id,
                    "snippet": {
                        "authorDisplayName": "Some display name",
                        "authorProfileImageUrl": "http://sample.com/pic.jpg",
                        "textOriginal": "Original text",
                        "textDisplay": "Display text",
                        "publishedAt": "2018-01-01T00:00:00Z",
                        "updatedAt": "2018-01-01T00:00:00Z"
                    }
                }
            }
        }))
        .unwrap()
    }

    async fn stored_video(harness: &Harness, external_id: &str) -> Video {
        let video = Video::from_new(VideoKey::new(), NewVideo::new(external_id, "Video", Utc::now()));
        harness.store.create_video(&video).await.unwrap().entity
    }

    fn task(video: &Video) -> Task {
        Task::ImportComments {
            video_key: video.key.clone(),
        }
    }

    #[tokio::test]
    async fn test_imports_comment_and_queues_analysis() {
        let harness = Harness::new();
        let video = stored_video(&harness, "video1234").await;

        let mut media = MockMediaClient::new();
        media
            .expect_get_comments()
            .withf(|id, _| id == "video1234")
            .times(1)
            .returning(|_, _| Ok(vec![thread("comment1234")]));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let comments = harness.store.list_comments(&video.key).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].external_id, "comment1234");
        assert_eq!(
            harness.queue.pending(QueueName::Analyze),
            vec![Task::AnalyzeComment {
                comment_key: CommentKey::for_comment(&video.key, "comment1234"),
            }]
        );
    }

    #[tokio::test]
    async fn test_redelivery_does_not_duplicate() {
        let harness = Harness::new();
        let video = stored_video(&harness, "video1234").await;

        let mut media = MockMediaClient::new();
        media
            .expect_get_comments()
            .times(2)
            .returning(|_, _| Ok(vec![thread("c1"), thread("c2"), thread("c1")]));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        handler.handle(&task(&video)).await.unwrap();
        assert_eq!(harness.store.list_comments(&video.key).await.unwrap().len(), 2);
        assert_eq!(harness.queue.pending(QueueName::Analyze).len(), 2);

        // c1 gets analyzed before the redelivery
        let key = CommentKey::for_comment(&video.key, "c1");
        let c1 = harness.store.get_comment(&key).await.unwrap().unwrap();
        let analysis = SentimentAnalysis {
            document_sentiment: Sentiment::new(0.3, 0.3),
            ..Default::default()
        };
        yj_store::patch_comment(
            harness.store.as_ref(),
            c1,
            &yj_models::CommentPatch::Sentiment(analysis),
        )
        .await
        .unwrap();

        handler.handle(&task(&video)).await.unwrap();
        assert_eq!(harness.store.list_comments(&video.key).await.unwrap().len(), 2);
        // Only the still-unanalyzed c2 is queued again
        let pending = harness.queue.pending(QueueName::Analyze);
        assert_eq!(pending.len(), 3);
        assert_eq!(
            pending[2],
            Task::AnalyzeComment {
                comment_key: CommentKey::for_comment(&video.key, "c2"),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_video_has_no_side_effects() {
        let harness = Harness::new();
        let mut media = MockMediaClient::new();
        media.expect_get_comments().never();
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler
            .handle(&Task::ImportComments {
                video_key: VideoKey::from("gone"),
            })
            .await
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::EntityMissing));
        assert_eq!(harness.store.write_count(), 0);
        assert!(harness.queue.history().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_swallowed() {
        let harness = Harness::new();
        let video = stored_video(&harness, "removed").await;
        let writes = harness.store.write_count();

        let mut media = MockMediaClient::new();
        media
            .expect_get_comments()
            .returning(|_, _| Err(MediaError::RequestFailed("403: commentsDisabled".into())));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::UpstreamFailed));
        assert_eq!(harness.store.write_count(), writes);
        assert!(harness.queue.history().is_empty());
    }

    #[tokio::test]
    async fn test_no_comments_is_no_work() {
        let harness = Harness::new();
        let video = stored_video(&harness, "quiet").await;

        let mut media = MockMediaClient::new();
        media.expect_get_comments().returning(|_, _| Ok(vec![]));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let outcome = handler.handle(&task(&video)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped(SkipReason::NoWork));
        assert!(harness.queue.history().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let harness = Harness::new();
        let video = stored_video(&harness, "video1234").await;
        harness.store.set_fail_writes(true);

        let mut media = MockMediaClient::new();
        media
            .expect_get_comments()
            .returning(|_, _| Ok(vec![thread("c1")]));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let err = handler.handle(&task(&video)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(harness.queue.history().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_enqueue_is_retryable() {
        let harness = Harness::new();
        let video = stored_video(&harness, "video1234").await;
        harness.queue.set_reject_enqueue(true);

        let mut media = MockMediaClient::new();
        media
            .expect_get_comments()
            .returning(|_, _| Ok(vec![thread("c1")]));
        let handler = ImportCommentsHandler::new(harness.context(media, MockSentimentClient::new()));

        let err = handler.handle(&task(&video)).await.unwrap_err();
        assert!(err.is_retryable());
        // The comment stays; the redelivery will queue its analysis
        assert_eq!(harness.store.list_comments(&video.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_task_is_rejected() {
        let harness = Harness::new();
        let handler = ImportCommentsHandler::new(
            harness.context(MockMediaClient::new(), MockSentimentClient::new()),
        );
        let err = handler
            .handle(&Task::AnalyzeTranscript {
                video_key: VideoKey::from("v1"),
            })
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
