//! Derived pipeline progress, computed from stored fields on demand.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::comment::VideoComment;
use crate::sentiment::SentimentLabel;
use crate::video::{TranscriptStage, Video};

/// True when every comment has been analyzed.
///
/// Vacuously true for zero comments, which cannot be told apart from
/// "comments not imported yet".
pub fn all_comments_analyzed<'a, I>(comments: I) -> bool
where
    I: IntoIterator<Item = &'a VideoComment>,
{
    comments.into_iter().all(VideoComment::analysis_complete)
}

/// True when every comment has been analyzed or given up on.
pub fn all_comments_settled<'a, I>(comments: I) -> bool
where
    I: IntoIterator<Item = &'a VideoComment>,
{
    comments.into_iter().all(VideoComment::analysis_settled)
}

/// Comment sentiment counts for a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    /// Comments that could not be analyzed
    pub failed: usize,
    /// Comments still waiting for a sentiment result
    pub pending: usize,
}

impl SentimentBreakdown {
    pub fn from_comments<'a, I>(comments: I) -> Self
    where
        I: IntoIterator<Item = &'a VideoComment>,
    {
        let mut breakdown = Self::default();
        for comment in comments {
            if !comment.analysis_complete() {
                if comment.analysis_failed {
                    breakdown.failed += 1;
                } else {
                    breakdown.pending += 1;
                }
                continue;
            }
            match SentimentLabel::classify(comment.sentiment_score) {
                SentimentLabel::Positive => breakdown.positive += 1,
                SentimentLabel::Neutral => breakdown.neutral += 1,
                SentimentLabel::Negative => breakdown.negative += 1,
            }
        }
        breakdown
    }

    pub fn analyzed(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    pub fn total(&self) -> usize {
        self.analyzed() + self.failed + self.pending
    }

    /// `(label, count)` pairs for chart rendering.
    pub fn series(&self) -> [(SentimentLabel, usize); 3] {
        [
            (SentimentLabel::Positive, self.positive),
            (SentimentLabel::Neutral, self.neutral),
            (SentimentLabel::Negative, self.negative),
        ]
    }
}

/// Snapshot of a video's pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoProgress {
    pub transcript: TranscriptStage,
    pub comments: SentimentBreakdown,
}

impl VideoProgress {
    pub fn of(video: &Video, comments: &[VideoComment]) -> Self {
        Self {
            transcript: video.transcript_stage(),
            comments: SentimentBreakdown::from_comments(comments),
        }
    }

    /// No comment is still waiting on analysis.
    pub fn comments_complete(&self) -> bool {
        self.comments.pending == 0
    }
}
