//! Work triggered by entity creation.

use std::sync::Arc;

use tracing::{error, info};

use yj_models::Video;
use yj_queue::{QueueName, Task, TaskId, TaskName, TaskQueue};

use crate::metrics;

/// What a trigger managed to enqueue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerReport {
    pub enqueued: Vec<(QueueName, TaskId)>,
    pub failed: Vec<(QueueName, TaskName)>,
}

impl TriggerReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Starts the import pipeline for newly created videos.
///
/// Called once, after the video's first successful persist. Later saves of
/// the same video must not go through here.
#[derive(Clone)]
pub struct EventTrigger {
    queue: Arc<dyn TaskQueue>,
}

impl EventTrigger {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Tasks started for a new video, with the queue each goes to.
    pub fn tasks_for(video: &Video) -> [(QueueName, Task); 2] {
        [
            (
                QueueName::Comments,
                Task::ImportComments {
                    video_key: video.key.clone(),
                },
            ),
            (
                QueueName::Videos,
                Task::ImportTranscript {
                    video_key: video.key.clone(),
                },
            ),
        ]
    }

    /// Enqueue the imports for `video`.
    ///
    /// The video is already committed, so a rejected enqueue is logged and
    /// reported but never returned as an error.
    pub async fn video_created(&self, video: &Video) -> TriggerReport {
        let mut report = TriggerReport::default();

        for (queue, task) in Self::tasks_for(video) {
            let name = task.name();
            match self.queue.enqueue(queue, task).await {
                Ok(id) => {
                    metrics::record_enqueued(queue, name);
                    report.enqueued.push((queue, id));
                }
                Err(e) => {
                    metrics::record_enqueue_failure(queue, name);
                    error!(
                        video_key = %video.key,
                        queue = %queue,
                        task = %name,
                        error = %e,
                        "Failed to enqueue task for new video"
                    );
                    report.failed.push((queue, name));
                }
            }
        }

        info!(
            video_key = %video.key,
            external_id = %video.external_id,
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Triggered imports for new video"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use yj_models::{NewVideo, VideoKey};
    use yj_queue::{MockTaskQueue, QueueError};

    fn video() -> Video {
        Video::from_new(VideoKey::from("v1"), NewVideo::new("abc", "Video", Utc::now()))
    }

    #[tokio::test]
    async fn test_enqueues_both_imports() {
        let mut queue = MockTaskQueue::new();
        queue
            .expect_enqueue()
            .withf(|q, t| {
                *q == QueueName::Comments
                    && *t == Task::ImportComments {
                        video_key: VideoKey::from("v1"),
                    }
            })
            .times(1)
            .returning(|_, _| Ok(TaskId::new()));
        queue
            .expect_enqueue()
            .withf(|q, t| {
                *q == QueueName::Videos
                    && *t == Task::ImportTranscript {
                        video_key: VideoKey::from("v1"),
                    }
            })
            .times(1)
            .returning(|_, _| Ok(TaskId::new()));

        let report = EventTrigger::new(Arc::new(queue)).video_created(&video()).await;
        assert!(report.is_complete());
        assert_eq!(report.enqueued.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_enqueue_does_not_stop_the_other() {
        let mut queue = MockTaskQueue::new();
        queue
            .expect_enqueue()
            .withf(|q, _| *q == QueueName::Comments)
            .times(1)
            .returning(|_, _| Err(QueueError::enqueue_failed("redis down")));
        queue
            .expect_enqueue()
            .withf(|q, _| *q == QueueName::Videos)
            .times(1)
            .returning(|_, _| Ok(TaskId::new()));

        let report = EventTrigger::new(Arc::new(queue)).video_created(&video()).await;
        assert!(!report.is_complete());
        assert_eq!(report.failed, vec![(QueueName::Comments, TaskName::ImportComments)]);
        assert_eq!(report.enqueued.len(), 1);
    }
}
