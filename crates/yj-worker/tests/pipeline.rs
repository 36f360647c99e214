//! End-to-end pipeline runs against the in-memory store and broker.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use yj_language::{MockSentimentClient, SentimentError};
use yj_models::{
    CommentKey, NewVideo, Sentiment, SentimentAnalysis, SentimentLabel, TranscriptStage, Video,
    VideoKey, VideoPatch,
};
use yj_queue::{MemoryQueue, QueueName, RetryPolicy, Task, TaskQueue};
use yj_store::{patch_video, EntityStore, MemoryStore};
use yj_worker::{
    EventTrigger, TaskContext, TaskExecutor, TaskOutcome, TaskRegistry, VideoIngestor,
    WorkerConfig,
};
use yj_youtube::{CommentThread, MediaError, MockMediaClient};

struct Pipeline {
    store: Arc<MemoryStore>,
    queue: Arc<MemoryQueue>,
    registry: TaskRegistry,
    executor: TaskExecutor,
    ingestor: VideoIngestor,
}

impl Pipeline {
    fn new(media: MockMediaClient, sentiment: MockSentimentClient) -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let media = Arc::new(media);

        let ctx = TaskContext::new(store.clone(), queue.clone(), media.clone(), Arc::new(sentiment));
        let registry = TaskRegistry::standard(Arc::new(ctx));
        let config = WorkerConfig {
            retry: RetryPolicy::immediate(3),
            ..Default::default()
        };
        let executor = TaskExecutor::new(config, queue.clone(), registry.clone());
        let ingestor = VideoIngestor::new(store.clone(), media, EventTrigger::new(queue.clone()));

        Self {
            store,
            queue,
            registry,
            executor,
            ingestor,
        }
    }

    async fn create(&self, external_id: &str) -> Video {
        self.ingestor
            .create_video(NewVideo::new(external_id, "Video", Utc::now()))
            .await
            .unwrap()
    }

    async fn video(&self, key: &VideoKey) -> Video {
        self.store.get_video(key).await.unwrap().unwrap().entity
    }
}

fn thread(id: &str, text: &str) -> CommentThread {
    serde_json::from_value(json!({
        "id": format!("thread-{id}"),
        "snippet": {
            "topLevelComment": {
                "id": id,
                "snippet": {
                    "authorDisplayName": "Some display name",
                    "authorProfileImageUrl": "http://sample.com/pic.jpg",
                    "textOriginal": text,
                    "textDisplay": text,
                    "publishedAt": "2018-01-01T00:00:00Z",
                    "updatedAt": "2018-01-02T00:00:00Z"
                }
            }
        }
    }))
    .unwrap()
}

/// Scores text by keyword so each entity gets a recognizable result.
fn score_text(text: &str) -> SentimentAnalysis {
    let score = if text.contains("awesome") {
        0.8
    } else if text.contains("rubbish") {
        -0.8
    } else {
        0.0
    };
    SentimentAnalysis {
        document_sentiment: Sentiment::new(score, score.abs() + 0.1),
        language: Some("en".to_string()),
        sentences: vec![],
    }
}

fn keyword_sentiment() -> MockSentimentClient {
    let mut sentiment = MockSentimentClient::new();
    sentiment
        .expect_analyze_sentiment()
        .returning(|text| Ok(score_text(text)));
    sentiment
}

#[tokio::test]
async fn test_new_video_runs_to_completion() {
    let mut media = MockMediaClient::new();
    media
        .expect_get_comments()
        .withf(|id, _| id == "video1234")
        .times(1)
        .returning(|_, _| Ok(vec![thread("comment1234", "Rob is rubbish")]));
    media
        .expect_get_transcript()
        .withf(|id| id == "video1234")
        .times(1)
        .returning(|_| Ok(Some("Rob is awesome".to_string())));
    let pipeline = Pipeline::new(media, keyword_sentiment());

    let video = pipeline.create("video1234").await;
    assert_eq!(pipeline.queue.history().len(), 2);
    assert_eq!(video.transcript_stage(), TranscriptStage::Pending);

    // Both imports, then both analyses
    assert_eq!(pipeline.executor.run_until_idle().await.unwrap(), 4);
    assert!(pipeline.queue.is_empty());
    assert!(pipeline.queue.dead_letters().is_empty());

    let video = pipeline.video(&video.key).await;
    assert!(video.analysis_complete());
    assert_eq!(video.transcript_stage(), TranscriptStage::Analyzed);
    assert_eq!(video.sentiment_score, 0.8);

    let comments = pipeline.store.list_comments(&video.key).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].external_id, "comment1234");
    assert_eq!(
        SentimentLabel::from_score(Some(comments[0].sentiment_score)),
        Some(SentimentLabel::Negative)
    );
    assert!(pipeline.store.all_comments_analyzed(&video.key).await.unwrap());

    let progress = pipeline.store.video_progress(&video.key).await.unwrap().unwrap();
    assert!(progress.comments_complete());
}

#[tokio::test]
async fn test_one_comment_yields_one_analysis_task() {
    let mut media = MockMediaClient::new();
    media
        .expect_get_comments()
        .returning(|_, _| Ok(vec![thread("comment1234", "hello")]));
    let pipeline = Pipeline::new(media, MockSentimentClient::new());

    let video = Video::from_new(VideoKey::new(), NewVideo::new("video1234", "Video", Utc::now()));
    pipeline.store.create_video(&video).await.unwrap();

    let outcome = pipeline
        .registry
        .dispatch(&Task::ImportComments {
            video_key: video.key.clone(),
        })
        .await;
    tokio_test::assert_ok!(outcome);

    assert_eq!(
        pipeline.queue.history(),
        vec![(
            QueueName::Analyze,
            Task::AnalyzeComment {
                comment_key: CommentKey::for_comment(&video.key, "comment1234"),
            }
        )]
    );
}

#[tokio::test]
async fn test_update_after_creation_enqueues_nothing() {
    let pipeline = Pipeline::new(MockMediaClient::new(), MockSentimentClient::new());

    let video = pipeline.create("abc").await;
    let history = pipeline.queue.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].0, QueueName::Comments);
    assert_eq!(history[1].0, QueueName::Videos);

    let current = pipeline.store.get_video(&video.key).await.unwrap().unwrap();
    let patch = VideoPatch::transcript("edited by hand").unwrap();
    patch_video(pipeline.store.as_ref(), current, &patch).await.unwrap();

    assert_eq!(pipeline.queue.history().len(), 2);
}

#[tokio::test]
async fn test_missing_entities_have_no_side_effects() {
    let mut media = MockMediaClient::new();
    media.expect_get_comments().never();
    media.expect_get_transcript().never();
    let mut sentiment = MockSentimentClient::new();
    sentiment.expect_analyze_sentiment().never();
    let pipeline = Pipeline::new(media, sentiment);

    let gone = VideoKey::from("gone");
    let tasks = [
        (QueueName::Comments, Task::ImportComments { video_key: gone.clone() }),
        (QueueName::Videos, Task::ImportTranscript { video_key: gone.clone() }),
        (QueueName::Analyze, Task::AnalyzeTranscript { video_key: gone.clone() }),
        (
            QueueName::Analyze,
            Task::AnalyzeComment {
                comment_key: CommentKey::for_comment(&gone, "c1"),
            },
        ),
    ];
    for (queue, task) in tasks {
        pipeline.queue.enqueue(queue, task).await.unwrap();
    }

    assert_eq!(pipeline.executor.run_until_idle().await.unwrap(), 4);
    assert_eq!(pipeline.store.write_count(), 0);
    assert_eq!(pipeline.queue.history().len(), 4);
    assert!(pipeline.queue.dead_letters().is_empty());
}

#[tokio::test]
async fn test_upstream_failures_are_not_retried() {
    let mut media = MockMediaClient::new();
    media
        .expect_get_comments()
        .times(1)
        .returning(|_, _| Err(MediaError::RequestFailed("403: quotaExceeded".to_string())));
    media
        .expect_get_transcript()
        .times(1)
        .returning(|_| Ok(Some("Rob is awesome".to_string())));
    let mut sentiment = MockSentimentClient::new();
    sentiment
        .expect_analyze_sentiment()
        .times(1)
        .returning(|_| Err(SentimentError::ServiceUnavailable("503".to_string())));
    let pipeline = Pipeline::new(media, sentiment);

    let video = pipeline.create("video1234").await;

    // Import comments, import transcript, analyze transcript; one delivery each
    assert_eq!(pipeline.executor.run_until_idle().await.unwrap(), 3);
    assert!(pipeline.queue.dead_letters().is_empty());

    let video = pipeline.video(&video.key).await;
    assert_eq!(video.transcript_stage(), TranscriptStage::Ready);
    assert!(!video.analysis_complete());
}

#[tokio::test]
async fn test_given_up_work_settles_progress() {
    let mut media = MockMediaClient::new();
    media.expect_get_comments().times(1).returning(|_, _| {
        Ok(vec![
            thread("c-good", "Rob is awesome"),
            thread("c-bad", "¿qué?"),
        ])
    });
    media.expect_get_transcript().times(1).returning(|_| Ok(None));
    let mut sentiment = MockSentimentClient::new();
    sentiment
        .expect_analyze_sentiment()
        .returning(|text| {
            if text.contains("awesome") {
                Ok(score_text(text))
            } else {
                Err(SentimentError::RequestFailed("400: unsupported language".to_string()))
            }
        });
    let pipeline = Pipeline::new(media, sentiment);

    let video = pipeline.create("video1234").await;
    // Both imports, then both comment analyses; no transcript to analyze
    assert_eq!(pipeline.executor.run_until_idle().await.unwrap(), 4);
    assert!(pipeline.queue.dead_letters().is_empty());

    let video = pipeline.video(&video.key).await;
    assert_eq!(video.transcript_stage(), TranscriptStage::Failed);

    assert!(!pipeline.store.all_comments_analyzed(&video.key).await.unwrap());
    let comments = pipeline.store.list_comments(&video.key).await.unwrap();
    assert!(yj_models::all_comments_settled(&comments));

    let progress = pipeline.store.video_progress(&video.key).await.unwrap().unwrap();
    assert_eq!(progress.comments.positive, 1);
    assert_eq!(progress.comments.failed, 1);
    assert_eq!(progress.comments.pending, 0);
    assert!(progress.comments_complete());
}

#[tokio::test]
async fn test_store_failure_is_retried_then_dead_lettered() {
    let mut media = MockMediaClient::new();
    media
        .expect_get_transcript()
        .times(3)
        .returning(|_| Ok(Some("hello".to_string())));
    let pipeline = Pipeline::new(media, MockSentimentClient::new());

    let video = Video::from_new(VideoKey::new(), NewVideo::new("video1234", "Video", Utc::now()));
    pipeline.store.create_video(&video).await.unwrap();
    pipeline.store.set_fail_writes(true);
    pipeline
        .queue
        .enqueue(
            QueueName::Videos,
            Task::ImportTranscript {
                video_key: video.key.clone(),
            },
        )
        .await
        .unwrap();

    assert_eq!(pipeline.executor.run_until_idle().await.unwrap(), 3);

    let dead = pipeline.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].envelope.attempt, 3);
    assert!(pipeline.queue.pending(QueueName::Analyze).is_empty());
    assert_eq!(pipeline.video(&video.key).await.transcript, "");
}

#[tokio::test]
async fn test_comments_are_analyzed_concurrently() {
    let mut media = MockMediaClient::new();
    media.expect_get_comments().returning(|_, _| {
        Ok((0..20)
            .map(|i| {
                let text = if i % 2 == 0 { "awesome" } else { "rubbish" };
                thread(&format!("c{i}"), text)
            })
            .collect())
    });
    let pipeline = Pipeline::new(media, keyword_sentiment());

    let video = Video::from_new(VideoKey::new(), NewVideo::new("video1234", "Video", Utc::now()));
    pipeline.store.create_video(&video).await.unwrap();
    pipeline
        .registry
        .dispatch(&Task::ImportComments {
            video_key: video.key.clone(),
        })
        .await
        .unwrap();

    let tasks = pipeline.queue.pending(QueueName::Analyze);
    assert_eq!(tasks.len(), 20);
    let outcomes = futures::future::join_all(tasks.iter().map(|t| pipeline.registry.dispatch(t))).await;
    for outcome in outcomes {
        assert_eq!(outcome.unwrap(), TaskOutcome::Completed);
    }

    assert!(pipeline.store.all_comments_analyzed(&video.key).await.unwrap());
    let comments = pipeline.store.list_comments(&video.key).await.unwrap();
    let positive = comments.iter().filter(|c| c.sentiment_score > 0.0).count();
    assert_eq!(positive, 10);
}

#[tokio::test]
async fn test_transcript_analysis_and_import_do_not_clobber_each_other() {
    let mut media = MockMediaClient::new();
    media
        .expect_get_transcript()
        .returning(|_| Ok(Some("Rob is awesome, really".to_string())));
    let pipeline = Pipeline::new(media, keyword_sentiment());

    let video = Video::from_new(VideoKey::new(), NewVideo::new("video1234", "Video", Utc::now()));
    let stored = pipeline.store.create_video(&video).await.unwrap();
    pipeline
        .store
        .update_video(
            &video.key,
            &stored.version,
            &VideoPatch::transcript("Rob is awesome").unwrap(),
        )
        .await
        .unwrap();

    // A reimport and an analysis of the earlier transcript race each other
    let import = Task::ImportTranscript {
        video_key: video.key.clone(),
    };
    let analyze = Task::AnalyzeTranscript {
        video_key: video.key.clone(),
    };
    let (a, b) = tokio::join!(
        pipeline.registry.dispatch(&import),
        pipeline.registry.dispatch(&analyze)
    );
    a.unwrap();
    b.unwrap();

    let video = pipeline.video(&video.key).await;
    assert_eq!(video.transcript, "Rob is awesome, really");
    assert!(video.analysis_complete());
}
