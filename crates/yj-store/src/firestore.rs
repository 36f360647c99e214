//! [`EntityStore`] backed by Firestore.

use async_trait::async_trait;
use tracing::debug;

use yj_models::{CommentKey, CommentPatch, Video, VideoComment, VideoKey, VideoPatch};

use crate::client::FirestoreClient;
use crate::codec::{self, COMMENTS, VIDEOS};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_conflict;
use crate::store::{CreateOutcome, EntityStore, UpdateOutcome, Version, Versioned};
use crate::types::{Document, StructuredQuery, ToFirestoreValue};

/// Videos and comments stored as two top-level collections.
///
/// Listing comments filters on `video_key` and sorts on two fields, which
/// needs a composite index on `video_comments (video_key, updated_at desc,
/// published_at desc)`.
#[derive(Clone)]
pub struct FirestoreStore {
    client: FirestoreClient,
}

impl FirestoreStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }

    fn version_of(doc: &Document) -> StoreResult<Version> {
        doc.update_time
            .as_deref()
            .map(Version::new)
            .ok_or_else(|| StoreError::invalid_document("document has no updateTime"))
    }

    fn versioned<T>(
        doc: &Document,
        decode: fn(&Document) -> StoreResult<T>,
    ) -> StoreResult<Versioned<T>> {
        Ok(Versioned::new(decode(doc)?, Self::version_of(doc)?))
    }

    fn update_outcome(result: StoreResult<Document>, entity: &'static str) -> StoreResult<UpdateOutcome> {
        match result {
            Ok(doc) => Ok(UpdateOutcome::Updated(Self::version_of(&doc)?)),
            Err(e) if e.is_precondition_failed() => {
                record_conflict(entity);
                Ok(UpdateOutcome::Conflict)
            }
            Err(e) if e.is_not_found() => Ok(UpdateOutcome::Missing),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EntityStore for FirestoreStore {
    async fn get_video(&self, key: &VideoKey) -> StoreResult<Option<Versioned<Video>>> {
        self.client
            .get_document(VIDEOS, key.as_str())
            .await?
            .map(|doc| Self::versioned(&doc, codec::video_from_document))
            .transpose()
    }

    async fn create_video(&self, video: &Video) -> StoreResult<Versioned<Video>> {
        let doc = self
            .client
            .create_document(VIDEOS, video.key.as_str(), codec::video_fields(video)?)
            .await?;
        Ok(Versioned::new(video.clone(), Self::version_of(&doc)?))
    }

    async fn update_video(
        &self,
        key: &VideoKey,
        expected: &Version,
        patch: &VideoPatch,
    ) -> StoreResult<UpdateOutcome> {
        let result = self
            .client
            .update_document_with_precondition(
                VIDEOS,
                key.as_str(),
                codec::video_patch_fields(patch)?,
                patch.field_paths(),
                expected.as_str(),
            )
            .await;
        Self::update_outcome(result, "video")
    }

    async fn list_videos(&self) -> StoreResult<Vec<Video>> {
        let query = StructuredQuery::collection(VIDEOS).order_desc("published_at");
        self.client
            .run_query(query)
            .await?
            .iter()
            .map(codec::video_from_document)
            .collect()
    }

    async fn get_comment(&self, key: &CommentKey) -> StoreResult<Option<Versioned<VideoComment>>> {
        self.client
            .get_document(COMMENTS, key.as_str())
            .await?
            .map(|doc| Self::versioned(&doc, codec::comment_from_document))
            .transpose()
    }

    async fn create_comment(
        &self,
        comment: &VideoComment,
    ) -> StoreResult<CreateOutcome<VideoComment>> {
        let created = self
            .client
            .create_document(COMMENTS, comment.key.as_str(), codec::comment_fields(comment)?)
            .await;

        match created {
            Ok(doc) => Ok(CreateOutcome::Created(Versioned::new(
                comment.clone(),
                Self::version_of(&doc)?,
            ))),
            Err(e) if e.is_already_exists() => {
                debug!(comment_key = %comment.key, "Comment already stored");
                match self.get_comment(&comment.key).await? {
                    Some(existing) => Ok(CreateOutcome::Existing(existing)),
                    // Deleted between the create and the read
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_comment(
        &self,
        key: &CommentKey,
        expected: &Version,
        patch: &CommentPatch,
    ) -> StoreResult<UpdateOutcome> {
        let result = self
            .client
            .update_document_with_precondition(
                COMMENTS,
                key.as_str(),
                codec::comment_patch_fields(patch)?,
                patch.field_paths(),
                expected.as_str(),
            )
            .await;
        Self::update_outcome(result, "comment")
    }

    async fn list_comments(&self, video: &VideoKey) -> StoreResult<Vec<VideoComment>> {
        let query = StructuredQuery::collection(COMMENTS)
            .where_eq("video_key", video.as_str().to_firestore_value())
            .order_desc("updated_at")
            .order_desc("published_at");
        self.client
            .run_query(query)
            .await?
            .iter()
            .map(codec::comment_from_document)
            .collect()
    }
}
