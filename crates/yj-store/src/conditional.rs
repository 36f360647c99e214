//! Read-then-conditional-write helpers.
//!
//! A patch is written against the revision the caller read. When another
//! writer got there first the entity is re-read and the patch retried on
//! the fresh revision, a bounded number of times.

use std::time::Duration;

use tracing::{debug, warn};

use yj_models::{CommentPatch, Video, VideoComment, VideoPatch};

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityStore, UpdateOutcome, Version, Versioned};

/// Attempts after the first conflicting write before giving up.
pub const MAX_CONFLICT_RETRIES: u32 = 5;

/// Result of a patch that went through conflict handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied(Version),
    /// The entity was deleted before the write landed.
    Missing,
}

fn conflict_delay(attempt: u32) -> Duration {
    Duration::from_millis(50 * (attempt as u64 + 1))
}

/// Write `patch` to the video read as `current`.
pub async fn patch_video(
    store: &dyn EntityStore,
    current: Versioned<Video>,
    patch: &VideoPatch,
) -> StoreResult<PatchOutcome> {
    let key = current.entity.key.clone();
    let mut version = current.version;

    for attempt in 0..=MAX_CONFLICT_RETRIES {
        match store.update_video(&key, &version, patch).await? {
            UpdateOutcome::Updated(v) => return Ok(PatchOutcome::Applied(v)),
            UpdateOutcome::Missing => return Ok(PatchOutcome::Missing),
            UpdateOutcome::Conflict => {
                debug!(video_key = %key, group = patch.group(), attempt, "Video changed since read, retrying");
                tokio::time::sleep(conflict_delay(attempt)).await;
                match store.get_video(&key).await? {
                    Some(fresh) => version = fresh.version,
                    None => return Ok(PatchOutcome::Missing),
                }
            }
        }
    }

    warn!(video_key = %key, group = patch.group(), "Gave up writing video after repeated conflicts");
    Err(StoreError::Contention(format!("videos/{}", key)))
}

/// Write `patch` to the comment read as `current`.
pub async fn patch_comment(
    store: &dyn EntityStore,
    current: Versioned<VideoComment>,
    patch: &CommentPatch,
) -> StoreResult<PatchOutcome> {
    let key = current.entity.key.clone();
    let mut version = current.version;

    for attempt in 0..=MAX_CONFLICT_RETRIES {
        match store.update_comment(&key, &version, patch).await? {
            UpdateOutcome::Updated(v) => return Ok(PatchOutcome::Applied(v)),
            UpdateOutcome::Missing => return Ok(PatchOutcome::Missing),
            UpdateOutcome::Conflict => {
                debug!(comment_key = %key, attempt, "Comment changed since read, retrying");
                tokio::time::sleep(conflict_delay(attempt)).await;
                match store.get_comment(&key).await? {
                    Some(fresh) => version = fresh.version,
                    None => return Ok(PatchOutcome::Missing),
                }
            }
        }
    }

    warn!(comment_key = %key, "Gave up writing comment after repeated conflicts");
    Err(StoreError::Contention(format!("video_comments/{}", key)))
}
