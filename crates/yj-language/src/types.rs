//! Request payloads for `documents:analyzeSentiment`.
//!
//! The response is decoded straight into [`yj_models::SentimentAnalysis`].

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeSentimentRequest<'a> {
    pub document: RequestDocument<'a>,
    pub encoding_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDocument<'a> {
    pub language: &'a str,
    pub content: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl<'a> AnalyzeSentimentRequest<'a> {
    pub fn plain_text(content: &'a str, language: &'a str) -> Self {
        Self {
            document: RequestDocument {
                language,
                content,
                kind: "PLAIN_TEXT",
            },
            encoding_type: "UTF8",
        }
    }
}
