//! Video comments.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::{CommentKey, VideoKey};
use crate::sentiment::SentimentAnalysis;

/// A top-level comment on a [`Video`](crate::Video).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoComment {
    pub key: CommentKey,

    /// Owning video
    pub video_key: VideoKey,

    /// Platform comment id
    pub external_id: String,

    #[serde(default)]
    pub author_display_name: String,

    #[serde(default)]
    pub author_profile_image_url: String,

    /// Plain text as written
    pub comment_raw: String,

    /// Rendered (HTML) text
    #[serde(default)]
    pub comment_rich: String,

    pub published_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub analyzed_comment: Option<SentimentAnalysis>,

    /// Set when the comment could not be analyzed
    #[serde(default)]
    pub analysis_failed: bool,

    #[serde(default)]
    pub sentiment_score: f64,

    #[serde(default)]
    pub sentiment_magnitude: f64,
}

impl VideoComment {
    /// A freshly imported, unanalyzed comment keyed by `(video, external_id)`.
    #[allow(clippy::too_many_arguments)]
    pub fn imported(
        video_key: &VideoKey,
        external_id: impl Into<String>,
        author_display_name: impl Into<String>,
        author_profile_image_url: impl Into<String>,
        comment_raw: impl Into<String>,
        comment_rich: impl Into<String>,
        published_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            key: CommentKey::for_comment(video_key, &external_id),
            video_key: video_key.clone(),
            external_id,
            author_display_name: author_display_name.into(),
            author_profile_image_url: author_profile_image_url.into(),
            comment_raw: comment_raw.into(),
            comment_rich: comment_rich.into(),
            published_at,
            updated_at,
            analyzed_comment: None,
            analysis_failed: false,
            sentiment_score: 0.0,
            sentiment_magnitude: 0.0,
        }
    }

    /// If the comment has a sentiment result, analysis was successful.
    pub fn analysis_complete(&self) -> bool {
        self.analyzed_comment.is_some()
    }

    /// Analyzed, or given up on. Nothing further will happen to it.
    pub fn analysis_settled(&self) -> bool {
        self.analysis_complete() || self.analysis_failed
    }

    pub fn apply(&mut self, patch: &CommentPatch) {
        match patch {
            CommentPatch::Sentiment(analysis) => {
                self.sentiment_score = analysis.score();
                self.sentiment_magnitude = analysis.magnitude();
                self.analyzed_comment = Some(analysis.clone());
                self.analysis_failed = false;
            }
            CommentPatch::AnalysisFailed => {
                self.analysis_failed = true;
            }
        }
    }
}

/// Field group written to a comment by a single task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "group", content = "value", rename_all = "snake_case")]
pub enum CommentPatch {
    Sentiment(SentimentAnalysis),
    /// Written when the comment cannot be analyzed.
    AnalysisFailed,
}

impl CommentPatch {
    pub fn field_paths(&self) -> &'static [&'static str] {
        match self {
            CommentPatch::Sentiment(_) => &[
                "analyzed_comment",
                "sentiment_score",
                "sentiment_magnitude",
                "analysis_failed",
            ],
            CommentPatch::AnalysisFailed => &["analysis_failed"],
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            CommentPatch::Sentiment(_) => "sentiment",
            CommentPatch::AnalysisFailed => "analysis_failed",
        }
    }
}
