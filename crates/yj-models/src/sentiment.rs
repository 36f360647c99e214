//! Sentiment analysis results and display labels.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Polarity and intensity of a piece of text.
///
/// The analysis API omits zero-valued fields, so both default to `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Sentiment {
    /// Signed polarity in `[-1.0, 1.0]`.
    #[serde(default)]
    pub score: f64,
    /// Unsigned intensity, unbounded above.
    #[serde(default)]
    pub magnitude: f64,
}

impl Sentiment {
    pub fn new(score: f64, magnitude: f64) -> Self {
        Self { score, magnitude }
    }

    pub fn label(&self) -> SentimentLabel {
        SentimentLabel::classify(self.score)
    }
}

/// Span of analyzed text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub begin_offset: i64,
}

/// Per-sentence sentiment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SentenceSentiment {
    #[serde(default)]
    pub text: TextSpan,
    #[serde(default)]
    pub sentiment: Sentiment,
}

/// Full result of a sentiment analysis call, stored verbatim on the analyzed entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    #[serde(default)]
    pub document_sentiment: Sentiment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub sentences: Vec<SentenceSentiment>,
}

impl SentimentAnalysis {
    /// Document-level score.
    pub fn score(&self) -> f64 {
        self.document_sentiment.score
    }

    /// Document-level magnitude.
    pub fn magnitude(&self) -> f64 {
        self.document_sentiment.magnitude
    }
}

/// Human readable classification of a sentiment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Display label for an optional score. `None` has no label.
    pub fn from_score(score: Option<f64>) -> Option<Self> {
        score.map(Self::classify)
    }

    /// Classify a score: exactly zero is neutral.
    pub fn classify(score: f64) -> Self {
        if score > 0.0 {
            SentimentLabel::Positive
        } else if score < 0.0 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Neutral => "Neutral",
            SentimentLabel::Negative => "Negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Display value for an optional sentiment score.
pub fn sentiment_display(score: Option<f64>) -> Option<&'static str> {
    SentimentLabel::from_score(score).map(|label| label.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_boundaries() {
        assert_eq!(sentiment_display(Some(0.0)), Some("Neutral"));
        assert_eq!(sentiment_display(Some(-0.0)), Some("Neutral"));
        assert_eq!(sentiment_display(Some(0.1)), Some("Positive"));
        assert_eq!(sentiment_display(Some(-0.1)), Some("Negative"));
        assert_eq!(sentiment_display(None), None);
    }

    #[test]
    fn test_label_display() {
        assert_eq!(SentimentLabel::Positive.to_string(), "Positive");
        assert_eq!(Sentiment::new(-0.4, 1.0).label(), SentimentLabel::Negative);
    }

    #[test]
    fn test_analysis_parses_api_payload_with_omitted_zeros() {
        let payload = r#"{
            "documentSentiment": {"magnitude": 0.9},
            "language": "en",
            "sentences": [
                {"text": {"content": "Hello world!", "beginOffset": 0},
                 "sentiment": {"magnitude": 0.9, "score": 0.9}}
            ]
        }"#;

        let analysis: SentimentAnalysis = serde_json::from_str(payload).unwrap();
        assert_eq!(analysis.score(), 0.0);
        assert_eq!(analysis.magnitude(), 0.9);
        assert_eq!(analysis.language.as_deref(), Some("en"));
        assert_eq!(analysis.sentences.len(), 1);
        assert_eq!(analysis.sentences[0].text.content, "Hello world!");
        assert_eq!(analysis.sentences[0].sentiment.score, 0.9);
    }
}
