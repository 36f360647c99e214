//! Video ingestion: the only place videos are created.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use yj_models::{NewVideo, Video, VideoKey};
use yj_store::EntityStore;
use yj_youtube::{parse_video_reference, MediaClient, VideoDetail};

use crate::error::{WorkerError, WorkerResult};
use crate::trigger::EventTrigger;

/// Creates videos from media platform lookups and starts their pipeline.
pub struct VideoIngestor {
    store: Arc<dyn EntityStore>,
    media: Arc<dyn MediaClient>,
    trigger: EventTrigger,
}

impl VideoIngestor {
    pub fn new(store: Arc<dyn EntityStore>, media: Arc<dyn MediaClient>, trigger: EventTrigger) -> Self {
        Self {
            store,
            media,
            trigger,
        }
    }

    /// Validate and persist a new video, then fire the creation trigger.
    ///
    /// Nothing is enqueued if validation or the store write fails.
    pub async fn create_video(&self, new_video: NewVideo) -> WorkerResult<Video> {
        new_video
            .validate()
            .map_err(|e| WorkerError::validation(e.to_string()))?;

        let video = Video::from_new(VideoKey::new(), new_video);
        let stored = self.store.create_video(&video).await?;
        info!(video_key = %stored.entity.key, external_id = %stored.entity.external_id, "Created video");

        let report = self.trigger.video_created(&stored.entity).await;
        if !report.is_complete() {
            warn!(
                video_key = %stored.entity.key,
                failed = report.failed.len(),
                "Video created but not all imports were queued"
            );
        }
        Ok(stored.entity)
    }

    /// Search the media platform, leaving out videos that are already stored.
    pub async fn search(&self, keywords: &str, max_results: u32) -> WorkerResult<Vec<VideoDetail>> {
        let found = self.media.search(keywords, max_results).await?;
        let known = self.stored_external_ids().await?;
        Ok(found
            .into_iter()
            .filter(|detail| !known.contains(&detail.id))
            .collect())
    }

    /// Create videos from URLs or bare ids. Videos already stored are skipped.
    pub async fn add_videos(&self, references: &[String]) -> WorkerResult<Vec<Video>> {
        let mut ids = Vec::with_capacity(references.len());
        for reference in references {
            let id = parse_video_reference(reference)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let known = self.stored_external_ids().await?;
        let wanted: Vec<String> = ids.into_iter().filter(|id| !known.contains(id)).collect();
        if wanted.is_empty() {
            info!("All referenced videos are already stored");
            return Ok(Vec::new());
        }

        let details = self.media.get(&wanted).await?;
        if details.len() < wanted.len() {
            warn!(
                requested = wanted.len(),
                found = details.len(),
                "Some referenced videos were not found"
            );
        }

        let mut created = Vec::with_capacity(details.len());
        for detail in details {
            created.push(self.create_video(detail.to_new_video()).await?);
        }
        Ok(created)
    }

    async fn stored_external_ids(&self) -> WorkerResult<HashSet<String>> {
        Ok(self
            .store
            .list_videos()
            .await?
            .into_iter()
            .map(|v| v.external_id)
            .collect())
    }
}
