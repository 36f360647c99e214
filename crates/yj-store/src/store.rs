//! The entity store interface used by the pipeline.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use yj_models::{
    all_comments_analyzed, CommentKey, CommentPatch, Video, VideoComment, VideoKey, VideoPatch,
    VideoProgress,
};

use crate::error::StoreResult;

/// Opaque token identifying the stored revision of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entity together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub entity: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(entity: T, version: Version) -> Self {
        Self { entity, version }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Written; the entity is now at this revision.
    Updated(Version),
    /// The entity changed since the expected revision; nothing was written.
    Conflict,
    /// The entity no longer exists.
    Missing,
}

/// Result of a create-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome<T> {
    Created(Versioned<T>),
    /// A record with the same key was already stored; it is returned unchanged.
    Existing(Versioned<T>),
}

impl<T> CreateOutcome<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }

    pub fn into_inner(self) -> Versioned<T> {
        match self {
            CreateOutcome::Created(v) | CreateOutcome::Existing(v) => v,
        }
    }
}

/// Key-addressed storage for videos and comments.
///
/// Gets by key are strongly consistent. Listings may lag recent writes.
/// Updates are conditional on the revision the caller read and only touch
/// the fields of the given patch.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_video(&self, key: &VideoKey) -> StoreResult<Option<Versioned<Video>>>;

    /// Persist a new video. Fails with `AlreadyExists` if the key is taken.
    async fn create_video(&self, video: &Video) -> StoreResult<Versioned<Video>>;

    async fn update_video(
        &self,
        key: &VideoKey,
        expected: &Version,
        patch: &VideoPatch,
    ) -> StoreResult<UpdateOutcome>;

    /// All videos, newest published first.
    async fn list_videos(&self) -> StoreResult<Vec<Video>>;

    async fn get_comment(&self, key: &CommentKey) -> StoreResult<Option<Versioned<VideoComment>>>;

    /// Persist a comment unless one with the same key exists.
    async fn create_comment(
        &self,
        comment: &VideoComment,
    ) -> StoreResult<CreateOutcome<VideoComment>>;

    async fn update_comment(
        &self,
        key: &CommentKey,
        expected: &Version,
        patch: &CommentPatch,
    ) -> StoreResult<UpdateOutcome>;

    /// Comments of a video, most recently updated first, then most recently published.
    async fn list_comments(&self, video: &VideoKey) -> StoreResult<Vec<VideoComment>>;

    /// True when every stored comment of the video has been analyzed.
    /// Vacuously true when no comments are stored.
    async fn all_comments_analyzed(&self, video: &VideoKey) -> StoreResult<bool> {
        let comments = self.list_comments(video).await?;
        Ok(all_comments_analyzed(&comments))
    }

    /// Derived pipeline state of a video, or `None` if it does not exist.
    async fn video_progress(&self, key: &VideoKey) -> StoreResult<Option<VideoProgress>> {
        let Some(video) = self.get_video(key).await? else {
            return Ok(None);
        };
        let comments = self.list_comments(key).await?;
        Ok(Some(VideoProgress::of(&video.entity, &comments)))
    }
}
