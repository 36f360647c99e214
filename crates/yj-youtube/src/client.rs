//! YouTube Data API HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::captions::transcript_from_xml;
use crate::error::{MediaError, MediaResult};
use crate::types::{
    CommentThread, CommentThreadListResponse, SearchListResponse, VideoDetail, VideoListResponse,
};

/// Most results `search.list` returns per request.
pub const SEARCH_MAX_RESULTS: u32 = 50;
/// Most ids `videos.list` accepts per request.
pub const VIDEOS_PER_REQUEST: usize = 50;
/// Most threads `commentThreads.list` returns per request.
pub const COMMENT_THREADS_MAX_RESULTS: u32 = 100;

/// Ordering of comment threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentOrder {
    #[default]
    Relevance,
    Time,
}

impl CommentOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentOrder::Relevance => "relevance",
            CommentOrder::Time => "time",
        }
    }
}

/// Paging options for comment threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentQuery {
    pub max_results: u32,
    pub order: CommentOrder,
}

impl Default for CommentQuery {
    fn default() -> Self {
        Self {
            max_results: 100,
            order: CommentOrder::Relevance,
        }
    }
}

/// Read access to the media platform.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait MediaClient: Send + Sync {
    /// Videos matching `query`, with full details. At most
    /// [`SEARCH_MAX_RESULTS`] are returned.
    async fn search(&self, query: &str, max_results: u32) -> MediaResult<Vec<VideoDetail>>;

    /// Details of the given videos. Unknown ids are left out.
    async fn get(&self, ids: &[String]) -> MediaResult<Vec<VideoDetail>>;

    /// Top-level comment threads of a video.
    async fn get_comments(
        &self,
        video_id: &str,
        query: CommentQuery,
    ) -> MediaResult<Vec<CommentThread>>;

    /// Plain-text transcript from the video's captions, or `None` if it has none.
    async fn get_transcript(&self, video_id: &str) -> MediaResult<Option<String>>;
}

/// Configuration for the YouTube client.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    /// Data API key
    pub api_key: String,
    /// Base URL of the Data API
    pub api_base_url: String,
    /// Base URL of the timed-text caption endpoint
    pub transcript_base_url: String,
    /// Caption language
    pub language: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            transcript_base_url: "https://www.youtube.com/api/timedtext".to_string(),
            language: "en".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

impl YouTubeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        let defaults = Self::default();
        let api_key = std::env::var("YOUTUBE_API_KEY")
            .map_err(|_| MediaError::Config("YOUTUBE_API_KEY must be set".to_string()))?;

        Ok(Self {
            api_key,
            api_base_url: std::env::var("YOUTUBE_API_URL").unwrap_or(defaults.api_base_url),
            transcript_base_url: std::env::var("YOUTUBE_TRANSCRIPT_URL")
                .unwrap_or(defaults.transcript_base_url),
            language: std::env::var("YOUTUBE_CAPTION_LANGUAGE").unwrap_or(defaults.language),
            timeout: Duration::from_secs(
                std::env::var("YOUTUBE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("YOUTUBE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        })
    }
}

/// Client for the YouTube Data API v3.
pub struct YouTubeClient {
    http: Client,
    config: YouTubeConfig,
}

impl YouTubeClient {
    /// Create a new client.
    pub fn new(config: YouTubeConfig) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MediaError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MediaResult<Self> {
        Self::new(YouTubeConfig::from_env()?)
    }

    pub fn config(&self) -> &YouTubeConfig {
        &self.config
    }

    /// GET a Data API resource and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, String)],
    ) -> MediaResult<T> {
        let url = format!("{}/{}", self.config.api_base_url, resource);
        debug!("Requesting YouTube {} with {} params", resource, params.len());

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .get(&url)
                    .query(params)
                    .query(&[("key", self.config.api_key.as_str())])
                    .send()
                    .await
                    .map_err(MediaError::Network)?;
                Self::check_status(response).await
            })
            .await?;

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| MediaError::invalid_response(format!("{} response: {}", resource, e)))
    }

    async fn check_status(response: Response) -> MediaResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(MediaError::from_status(status.as_u16(), body))
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MediaResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MediaResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "YouTube request failed (attempt {}), retrying in {:?}: {}",
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

        Err(last_error.unwrap_or(MediaError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl MediaClient for YouTubeClient {
    async fn search(&self, query: &str, max_results: u32) -> MediaResult<Vec<VideoDetail>> {
        let found: SearchListResponse = self
            .get_json(
                "search",
                &[
                    ("part", "id".to_string()),
                    ("type", "video".to_string()),
                    ("q", query.to_string()),
                    ("maxResults", max_results.min(SEARCH_MAX_RESULTS).to_string()),
                ],
            )
            .await?;

        let ids: Vec<String> = found
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();
        debug!(query, hits = ids.len(), "YouTube search finished");

        self.get(&ids).await
    }

    async fn get(&self, ids: &[String]) -> MediaResult<Vec<VideoDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut details = Vec::with_capacity(ids.len());
        for batch in ids.chunks(VIDEOS_PER_REQUEST) {
            let videos: VideoListResponse = self
                .get_json(
                    "videos",
                    &[
                        ("part", "snippet,statistics".to_string()),
                        ("id", batch.join(",")),
                    ],
                )
                .await?;
            details.extend(videos.items);
        }
        Ok(details)
    }

    async fn get_comments(
        &self,
        video_id: &str,
        query: CommentQuery,
    ) -> MediaResult<Vec<CommentThread>> {
        let threads: CommentThreadListResponse = self
            .get_json(
                "commentThreads",
                &[
                    ("part", "snippet".to_string()),
                    ("videoId", video_id.to_string()),
                    (
                        "maxResults",
                        query
                            .max_results
                            .clamp(1, COMMENT_THREADS_MAX_RESULTS)
                            .to_string(),
                    ),
                    ("order", query.order.as_str().to_string()),
                    ("textFormat", "html".to_string()),
                ],
            )
            .await?;
        Ok(threads.items)
    }

    async fn get_transcript(&self, video_id: &str) -> MediaResult<Option<String>> {
        let url = &self.config.transcript_base_url;

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .get(url)
                    .query(&[("lang", self.config.language.as_str()), ("v", video_id)])
                    .send()
                    .await
                    .map_err(MediaError::Network)?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                Self::check_status(response).await.map(Some)
            })
            .await?;

        let Some(response) = response else {
            debug!(video_id, "No captions for video");
            return Ok(None);
        };

        let xml = response.text().await?;
        transcript_from_xml(&xml)
    }
}
