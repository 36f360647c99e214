//! In-process [`EntityStore`] for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use yj_models::{CommentKey, CommentPatch, Video, VideoComment, VideoKey, VideoPatch};

use crate::error::{StoreError, StoreResult};
use crate::store::{CreateOutcome, EntityStore, UpdateOutcome, Version, Versioned};

#[derive(Default)]
struct Tables {
    videos: HashMap<VideoKey, (Video, u64)>,
    comments: HashMap<CommentKey, (VideoComment, u64)>,
}

/// Store kept in memory. Revisions come from a global counter, so every
/// successful write produces a new [`Version`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    revision: AtomicU64,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn begin_write(&self) -> StoreResult<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("writes disabled"));
        }
        Ok(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn committed(&self, revision: u64) -> Version {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Version::new(revision.to_string())
    }

    fn current(revision: u64) -> Version {
        Version::new(revision.to_string())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_video(&self, key: &VideoKey) -> StoreResult<Option<Versioned<Video>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .videos
            .get(key)
            .map(|(video, rev)| Versioned::new(video.clone(), Self::current(*rev))))
    }

    async fn create_video(&self, video: &Video) -> StoreResult<Versioned<Video>> {
        let mut tables = self.tables.write().await;
        if tables.videos.contains_key(&video.key) {
            return Err(StoreError::AlreadyExists(format!("videos/{}", video.key)));
        }
        let rev = self.begin_write()?;
        tables.videos.insert(video.key.clone(), (video.clone(), rev));
        Ok(Versioned::new(video.clone(), self.committed(rev)))
    }

    async fn update_video(
        &self,
        key: &VideoKey,
        expected: &Version,
        patch: &VideoPatch,
    ) -> StoreResult<UpdateOutcome> {
        let mut tables = self.tables.write().await;
        let Some((video, rev)) = tables.videos.get_mut(key) else {
            return Ok(UpdateOutcome::Missing);
        };
        if Self::current(*rev) != *expected {
            return Ok(UpdateOutcome::Conflict);
        }
        let next = self.begin_write()?;
        video.apply(patch);
        *rev = next;
        Ok(UpdateOutcome::Updated(self.committed(next)))
    }

    async fn list_videos(&self) -> StoreResult<Vec<Video>> {
        let tables = self.tables.read().await;
        let mut videos: Vec<Video> = tables.videos.values().map(|(v, _)| v.clone()).collect();
        videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(videos)
    }

    async fn get_comment(&self, key: &CommentKey) -> StoreResult<Option<Versioned<VideoComment>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .get(key)
            .map(|(comment, rev)| Versioned::new(comment.clone(), Self::current(*rev))))
    }

    async fn create_comment(
        &self,
        comment: &VideoComment,
    ) -> StoreResult<CreateOutcome<VideoComment>> {
        let mut tables = self.tables.write().await;
        if let Some((existing, rev)) = tables.comments.get(&comment.key) {
            return Ok(CreateOutcome::Existing(Versioned::new(
                existing.clone(),
                Self::current(*rev),
            )));
        }
        let rev = self.begin_write()?;
        tables
            .comments
            .insert(comment.key.clone(), (comment.clone(), rev));
        Ok(CreateOutcome::Created(Versioned::new(
            comment.clone(),
            self.committed(rev),
        )))
    }

    async fn update_comment(
        &self,
        key: &CommentKey,
        expected: &Version,
        patch: &CommentPatch,
    ) -> StoreResult<UpdateOutcome> {
        let mut tables = self.tables.write().await;
        let Some((comment, rev)) = tables.comments.get_mut(key) else {
            return Ok(UpdateOutcome::Missing);
        };
        if Self::current(*rev) != *expected {
            return Ok(UpdateOutcome::Conflict);
        }
        let next = self.begin_write()?;
        comment.apply(patch);
        *rev = next;
        Ok(UpdateOutcome::Updated(self.committed(next)))
    }

    async fn list_comments(&self, video: &VideoKey) -> StoreResult<Vec<VideoComment>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<VideoComment> = tables
            .comments
            .values()
            .filter(|(c, _)| &c.video_key == video)
            .map(|(c, _)| c.clone())
            .collect();
        comments.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.published_at.cmp(&a.published_at))
        });
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use yj_models::{NewVideo, Sentiment, SentimentAnalysis};

    fn video(external_id: &str) -> Video {
        Video::from_new(
            VideoKey::new(),
            NewVideo::new(external_id, "title", Utc::now()),
        )
    }

    fn comment(video: &VideoKey, id: &str, age_mins: i64) -> VideoComment {
        let at = Utc::now() - Duration::minutes(age_mins);
        VideoComment::imported(video, id, "a", "", "text", "", at, at)
    }

    #[tokio::test]
    async fn test_create_and_get_video() {
        let store = MemoryStore::new();
        let v = video("abc");
        let created = store.create_video(&v).await.unwrap();

        let fetched = store.get_video(&v.key).await.unwrap().unwrap();
        assert_eq!(fetched.entity, v);
        assert_eq!(fetched.version, created.version);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_create_video_twice_fails() {
        let store = MemoryStore::new();
        let v = video("abc");
        store.create_video(&v).await.unwrap();
        let err = store.create_video(&v).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let store = MemoryStore::new();
        let v = video("abc");
        let created = store.create_video(&v).await.unwrap();
        let patch = VideoPatch::transcript("hello").unwrap();

        let first = store.update_video(&v.key, &created.version, &patch).await.unwrap();
        assert!(matches!(first, UpdateOutcome::Updated(_)));

        // Stale version is rejected and nothing is written
        let writes = store.write_count();
        let second = store.update_video(&v.key, &created.version, &patch).await.unwrap();
        assert_eq!(second, UpdateOutcome::Conflict);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_update_missing_video() {
        let store = MemoryStore::new();
        let patch = VideoPatch::transcript("hello").unwrap();
        let outcome = store
            .update_video(&VideoKey::from("nope"), &Version::new("1"), &patch)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_create_comment_is_idempotent() {
        let store = MemoryStore::new();
        let key = VideoKey::new();
        let c = comment(&key, "comment1234", 0);

        assert!(store.create_comment(&c).await.unwrap().is_created());
        let again = store.create_comment(&c).await.unwrap();
        assert!(!again.is_created());
        assert_eq!(again.into_inner().entity, c);
        assert_eq!(store.list_comments(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_comments_filters_and_orders() {
        let store = MemoryStore::new();
        let v1 = VideoKey::new();
        let v2 = VideoKey::new();
        store.create_comment(&comment(&v1, "old", 10)).await.unwrap();
        store.create_comment(&comment(&v1, "new", 1)).await.unwrap();
        store.create_comment(&comment(&v2, "other", 0)).await.unwrap();

        let listed = store.list_comments(&v1).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_all_comments_analyzed_default_method() {
        let store = MemoryStore::new();
        let key = VideoKey::new();
        assert!(store.all_comments_analyzed(&key).await.unwrap());

        let c = comment(&key, "c1", 0);
        let created = store.create_comment(&c).await.unwrap().into_inner();
        assert!(!store.all_comments_analyzed(&key).await.unwrap());

        let patch = CommentPatch::Sentiment(SentimentAnalysis {
            document_sentiment: Sentiment::new(0.1, 0.1),
            ..Default::default()
        });
        store.update_comment(&c.key, &created.version, &patch).await.unwrap();
        assert!(store.all_comments_analyzed(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.create_video(&video("abc")).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.write_count(), 0);
    }
}
