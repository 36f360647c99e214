//! Cloud Natural Language HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use yj_models::SentimentAnalysis;

use crate::error::{SentimentError, SentimentResult};
use crate::types::AnalyzeSentimentRequest;

/// Sentiment scoring of free text.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SentimentClient: Send + Sync {
    async fn analyze_sentiment(&self, text: &str) -> SentimentResult<SentimentAnalysis>;
}

/// Configuration for the language client.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// API key
    pub api_key: String,
    /// Base URL of the Natural Language API
    pub base_url: String,
    /// Language hint sent with every document
    pub language: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://language.googleapis.com".to_string(),
            language: "en".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl LanguageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> SentimentResult<Self> {
        let defaults = Self::default();
        let api_key = std::env::var("CLOUD_NATURAL_LANG_API_KEY").map_err(|_| {
            SentimentError::Config("CLOUD_NATURAL_LANG_API_KEY must be set".to_string())
        })?;

        Ok(Self {
            api_key,
            base_url: std::env::var("CLOUD_NATURAL_LANG_URL").unwrap_or(defaults.base_url),
            language: std::env::var("CLOUD_NATURAL_LANG_LANGUAGE").unwrap_or(defaults.language),
            timeout: Duration::from_secs(
                std::env::var("CLOUD_NATURAL_LANG_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("CLOUD_NATURAL_LANG_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        })
    }
}

/// Client for `documents:analyzeSentiment`.
pub struct NaturalLanguageClient {
    http: Client,
    config: LanguageConfig,
}

impl NaturalLanguageClient {
    /// Create a new client.
    pub fn new(config: LanguageConfig) -> SentimentResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(SentimentError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> SentimentResult<Self> {
        Self::new(LanguageConfig::from_env()?)
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> SentimentResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SentimentResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Sentiment request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(SentimentError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl SentimentClient for NaturalLanguageClient {
    async fn analyze_sentiment(&self, text: &str) -> SentimentResult<SentimentAnalysis> {
        let url = format!("{}/v1/documents:analyzeSentiment", self.config.base_url);
        let body = AnalyzeSentimentRequest::plain_text(text, &self.config.language);

        debug!(chars = text.chars().count(), "Sending sentiment request");

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .query(&[("key", self.config.api_key.as_str())])
                    .json(&body)
                    .send()
                    .await
                    .map_err(SentimentError::Network)?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(SentimentError::from_status(status.as_u16(), body));
                }
                Ok(response)
            })
            .await?;

        let raw = response.text().await?;
        serde_json::from_str(&raw)
            .map_err(|e| SentimentError::InvalidResponse(format!("analyzeSentiment: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use yj_models::SentimentLabel;

    fn client(server: &MockServer) -> NaturalLanguageClient {
        NaturalLanguageClient::new(LanguageConfig {
            api_key: "test-key".to_string(),
            base_url: server.uri(),
            max_retries: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_sentiment() {
        let server = MockServer::start().await;
        let text = "Rob is awesome\nRob is rubbish\nMy name is Rob";
        Mock::given(method("POST"))
            .and(path("/v1/documents:analyzeSentiment"))
            .and(query_param("key", "test-key"))
            .and(body_json(json!({
                "document": {"language": "en", "content": text, "type": "PLAIN_TEXT"},
                "encodingType": "UTF8"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documentSentiment": {"score": 0.2, "magnitude": 3.6},
                "language": "en",
                "sentences": [
                    {"text": {"content": "Rob is awesome", "beginOffset": 0},
                     "sentiment": {"magnitude": 0.8, "score": 0.8}},
                    {"text": {"content": "Rob is rubbish", "beginOffset": 15},
                     "sentiment": {"magnitude": 0.8, "score": -0.8}},
                    // Zero values are left out by the API
                    {"text": {"content": "My name is Rob", "beginOffset": 30},
                     "sentiment": {}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = client(&server).analyze_sentiment(text).await.unwrap();
        assert_eq!(analysis.score(), 0.2);
        assert_eq!(analysis.magnitude(), 3.6);
        assert_eq!(analysis.sentences.len(), 3);
        assert_eq!(analysis.sentences[2].sentiment.score, 0.0);
        let labels: Vec<SentimentLabel> = analysis
            .sentences
            .iter()
            .map(|s| s.sentiment.label())
            .collect();
        assert_eq!(
            labels,
            vec![SentimentLabel::Positive, SentimentLabel::Negative, SentimentLabel::Neutral]
        );
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unsupported language"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).analyze_sentiment("hola").await.unwrap_err();
        assert!(matches!(err, SentimentError::RequestFailed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server).analyze_sentiment("text").await.unwrap_err();
        assert!(matches!(err, SentimentError::RateLimited));
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).analyze_sentiment("text").await.unwrap_err();
        assert!(matches!(err, SentimentError::InvalidResponse(_)));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::remove_var("CLOUD_NATURAL_LANG_API_KEY");
        assert!(LanguageConfig::from_env().is_err());

        std::env::set_var("CLOUD_NATURAL_LANG_API_KEY", "k");
        std::env::set_var("CLOUD_NATURAL_LANG_RETRIES", "5");
        let config = LanguageConfig::from_env().unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_url, "https://language.googleapis.com");
        std::env::remove_var("CLOUD_NATURAL_LANG_API_KEY");
        std::env::remove_var("CLOUD_NATURAL_LANG_RETRIES");
    }
}
