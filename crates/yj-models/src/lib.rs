//! Shared data models for the YouJudge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Videos and their comments
//! - Field-group patches written by background tasks
//! - Sentiment results and display labels
//! - Derived completion state

pub mod comment;
pub mod key;
pub mod progress;
pub mod sentiment;
pub mod video;

pub use comment::{CommentPatch, VideoComment};
pub use key::{CommentKey, VideoKey};
pub use progress::{all_comments_analyzed, all_comments_settled, SentimentBreakdown, VideoProgress};
pub use sentiment::{
    sentiment_display, SentenceSentiment, Sentiment, SentimentAnalysis, SentimentLabel, TextSpan,
};
pub use video::{NewVideo, TranscriptStage, Video, VideoPatch};
