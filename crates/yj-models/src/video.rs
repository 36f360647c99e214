//! Video records and the transcript field groups written by the pipeline.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::key::VideoKey;
use crate::sentiment::SentimentAnalysis;

/// A video imported from the media platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub key: VideoKey,

    /// Platform video id
    pub external_id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Empty until imported
    #[serde(default)]
    pub transcript: String,

    /// Full sentiment result for the transcript
    #[serde(default)]
    pub analyzed_transcript: Option<SentimentAnalysis>,

    /// Set when the transcript could not be imported
    #[serde(default)]
    pub transcript_failed: bool,

    /// Meaningful only once `analyzed_transcript` is set
    #[serde(default)]
    pub sentiment_score: f64,

    #[serde(default)]
    pub sentiment_magnitude: f64,

    pub published_at: DateTime<Utc>,

    #[serde(default)]
    pub thumbnail_default: String,

    #[serde(default)]
    pub thumbnail_medium: String,

    #[serde(default)]
    pub thumbnail_high: String,

    #[serde(default)]
    pub likes: u64,

    #[serde(default)]
    pub dislikes: u64,

    #[serde(default)]
    pub comment_count: u64,

    pub created_at: DateTime<Utc>,
}

impl Video {
    /// Build a fresh record for `new` under `key`.
    pub fn from_new(key: VideoKey, new: NewVideo) -> Self {
        Self {
            key,
            external_id: new.external_id,
            title: new.title,
            description: new.description,
            transcript: String::new(),
            analyzed_transcript: None,
            transcript_failed: false,
            sentiment_score: 0.0,
            sentiment_magnitude: 0.0,
            published_at: new.published_at,
            thumbnail_default: new.thumbnail_default,
            thumbnail_medium: new.thumbnail_medium,
            thumbnail_high: new.thumbnail_high,
            likes: new.likes,
            dislikes: new.dislikes,
            comment_count: new.comment_count,
            created_at: Utc::now(),
        }
    }

    /// True once the transcript has a sentiment result.
    pub fn analysis_complete(&self) -> bool {
        self.analyzed_transcript.is_some()
    }

    /// Videos can only be analyzed once a transcript is available.
    pub fn can_be_analyzed(&self) -> bool {
        !self.transcript.is_empty()
    }

    pub fn transcript_stage(&self) -> TranscriptStage {
        if self.analysis_complete() {
            TranscriptStage::Analyzed
        } else if self.can_be_analyzed() {
            TranscriptStage::Ready
        } else if self.transcript_failed {
            TranscriptStage::Failed
        } else {
            TranscriptStage::Pending
        }
    }

    /// Apply a field-group patch in place.
    pub fn apply(&mut self, patch: &VideoPatch) {
        match patch {
            VideoPatch::Transcript(text) => {
                self.transcript = text.clone();
                self.transcript_failed = false;
            }
            VideoPatch::TranscriptFailed => {
                self.transcript_failed = true;
            }
            VideoPatch::Sentiment(analysis) => {
                self.sentiment_score = analysis.score();
                self.sentiment_magnitude = analysis.magnitude();
                self.analyzed_transcript = Some(analysis.clone());
            }
        }
    }
}

/// Input for creating a video, usually projected from a media platform lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct NewVideo {
    #[validate(length(min = 1, max = 25))]
    pub external_id: String,

    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[serde(default)]
    pub description: String,

    pub published_at: DateTime<Utc>,

    #[serde(default)]
    #[validate(length(max = 255))]
    pub thumbnail_default: String,

    #[serde(default)]
    #[validate(length(max = 255))]
    pub thumbnail_medium: String,

    #[serde(default)]
    #[validate(length(max = 255))]
    pub thumbnail_high: String,

    #[serde(default)]
    pub likes: u64,

    #[serde(default)]
    pub dislikes: u64,

    #[serde(default)]
    pub comment_count: u64,
}

impl NewVideo {
    /// Minimal input with only the required fields set.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            description: String::new(),
            published_at,
            thumbnail_default: String::new(),
            thumbnail_medium: String::new(),
            thumbnail_high: String::new(),
            likes: 0,
            dislikes: 0,
            comment_count: 0,
        }
    }
}

/// Field group written to a video by a single task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "group", content = "value", rename_all = "snake_case")]
pub enum VideoPatch {
    /// Written by transcript import.
    Transcript(String),
    /// Written by transcript import when there is no transcript to store.
    TranscriptFailed,
    /// Written by transcript analysis.
    Sentiment(SentimentAnalysis),
}

impl VideoPatch {
    /// Transcript patch, or `None` for blank text. A transcript is never cleared.
    pub fn transcript(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            None
        } else {
            Some(VideoPatch::Transcript(text))
        }
    }

    /// Stored field names this patch writes.
    pub fn field_paths(&self) -> &'static [&'static str] {
        match self {
            VideoPatch::Transcript(_) => &["transcript", "transcript_failed"],
            VideoPatch::TranscriptFailed => &["transcript_failed"],
            VideoPatch::Sentiment(_) => &[
                "analyzed_transcript",
                "sentiment_score",
                "sentiment_magnitude",
            ],
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            VideoPatch::Transcript(_) => "transcript",
            VideoPatch::TranscriptFailed => "transcript_failed",
            VideoPatch::Sentiment(_) => "sentiment",
        }
    }
}

/// Where a video is in transcript processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStage {
    /// No transcript imported yet
    Pending,
    /// Import gave up: no captions, or the platform call failed
    Failed,
    /// Transcript imported, awaiting analysis
    Ready,
    /// Transcript sentiment stored
    Analyzed,
}

impl TranscriptStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStage::Pending => "pending",
            TranscriptStage::Failed => "failed",
            TranscriptStage::Ready => "ready",
            TranscriptStage::Analyzed => "analyzed",
        }
    }
}

impl fmt::Display for TranscriptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
