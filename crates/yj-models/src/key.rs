//! Opaque entity keys.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store key of a [`Video`](crate::Video).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoKey(pub String);

impl VideoKey {
    /// Generate a new random video key.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Store key of a [`VideoComment`](crate::VideoComment).
///
/// Derived from the owning video and the platform's comment id, so importing
/// the same comment twice addresses the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CommentKey(pub String);

impl CommentKey {
    /// Key for the comment `external_id` on `video`.
    ///
    /// The id is percent-encoded: Firestore document ids may not contain
    /// '/', and distinct ids must not map to the same key.
    pub fn for_comment(video: &VideoKey, external_id: &str) -> Self {
        Self(format!(
            "{}_{}",
            video.as_str(),
            urlencoding::encode(external_id)
        ))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommentKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommentKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
