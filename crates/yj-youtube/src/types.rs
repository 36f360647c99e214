//! YouTube Data API v3 payloads, trimmed to the fields the pipeline reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use yj_models::{NewVideo, VideoComment, VideoKey};

/// Statistics counts are sent as decimal strings. Absent means zero.
fn count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Raw::Number(n)) => Ok(n),
        Some(Raw::Text(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub results_per_page: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: SearchResultId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    pub kind: Option<String>,
    /// Set only for `youtube#video` results.
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoDetail>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetail {
    pub id: String,
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub statistics: VideoStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub published_at: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    #[serde(default, deserialize_with = "count")]
    pub view_count: u64,
    #[serde(default, deserialize_with = "count")]
    pub like_count: u64,
    #[serde(default, deserialize_with = "count")]
    pub dislike_count: u64,
    #[serde(default, deserialize_with = "count")]
    pub comment_count: u64,
}

impl VideoDetail {
    /// Input for creating a stored video from this detail.
    pub fn to_new_video(&self) -> NewVideo {
        let thumb = |t: &Option<Thumbnail>| t.as_ref().map(|t| t.url.clone()).unwrap_or_default();
        NewVideo {
            external_id: self.id.clone(),
            title: self.snippet.title.clone(),
            description: self.snippet.description.clone(),
            published_at: self.snippet.published_at,
            thumbnail_default: thumb(&self.snippet.thumbnails.default),
            thumbnail_medium: thumb(&self.snippet.thumbnails.medium),
            thumbnail_high: thumb(&self.snippet.thumbnails.high),
            likes: self.statistics.like_count,
            dislikes: self.statistics.dislike_count,
            comment_count: self.statistics.comment_count,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadListResponse {
    #[serde(default)]
    pub items: Vec<CommentThread>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentThread {
    pub id: String,
    pub snippet: CommentThreadSnippet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadSnippet {
    pub top_level_comment: Comment,
    #[serde(default)]
    pub total_reply_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    #[serde(default)]
    pub author_display_name: String,
    #[serde(default)]
    pub author_profile_image_url: String,
    pub text_original: String,
    #[serde(default)]
    pub text_display: String,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentThread {
    /// The top-level comment as a stored comment of `video`.
    pub fn to_video_comment(&self, video: &VideoKey) -> VideoComment {
        let comment = &self.snippet.top_level_comment;
        let s = &comment.snippet;
        VideoComment::imported(
            video,
            comment.id.as_str(),
            s.author_display_name.as_str(),
            s.author_profile_image_url.as_str(),
            s.text_original.as_str(),
            s.text_display.as_str(),
            s.published_at,
            s.updated_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video_json() -> serde_json::Value {
        json!({
            "kind": "youtube#video",
            "etag": "\"etag/123456789\"",
            "id": "video1234",
            "snippet": {
                "publishedAt": "2018-01-01T00:00:00.000Z",
                "channelId": "channel1234",
                "channelTitle": "channel Title",
                "title": "Video 1234",
                "description": "video 1234 description",
                "thumbnails": {
                    "default": {"url": "http://example.com/default.jpg", "width": 120, "height": 90},
                    "medium": {"url": "http://example.com/medium.jpg", "width": 320, "height": 180},
                    "high": {"url": "http://example.com/high.jpg", "width": 480, "height": 360},
                    "maxres": {"url": "http://example.com/maxres.jpg", "width": 1280, "height": 720}
                },
                "tags": ["tag1", "tag2"]
            },
            "statistics": {
                "commentCount": "9999",
                "dislikeCount": "9999",
                "favoriteCount": "9999",
                "likeCount": "9999",
                "viewCount": "9999"
            }
        })
    }

    #[test]
    fn test_video_detail_to_new_video() {
        let detail: VideoDetail = serde_json::from_value(video_json()).unwrap();
        let new = detail.to_new_video();

        assert_eq!(new.external_id, "video1234");
        assert_eq!(new.title, "Video 1234");
        assert_eq!(new.thumbnail_high, "http://example.com/high.jpg");
        assert_eq!(new.likes, 9999);
        assert_eq!(new.comment_count, 9999);
    }

    #[test]
    fn test_missing_statistics_default_to_zero() {
        let mut value = video_json();
        value["statistics"] = json!({"viewCount": "12"});
        let detail: VideoDetail = serde_json::from_value(value).unwrap();
        assert_eq!(detail.statistics.view_count, 12);
        assert_eq!(detail.statistics.dislike_count, 0);

        let mut value = video_json();
        value.as_object_mut().unwrap().remove("statistics");
        let detail: VideoDetail = serde_json::from_value(value).unwrap();
        assert_eq!(detail.statistics, VideoStatistics::default());
    }

    #[test]
    fn test_comment_thread_projection() {
        let thread: CommentThread = serde_json::from_value(json!({
            "kind": "youtube#commentThread",
            "id": "thread1234",
            "snippet": {
                "videoId": "video1234",
                "totalReplyCount": 500,
                "topLevelComment": {
                    "id": "comment1234",
                    "snippet": {
                        "authorDisplayName": "Some display name",
                        "authorProfileImageUrl": "http://sample.com/pic.jpg",
                        "textOriginal": "Original text",
                        "textDisplay": "Display text",
                        "publishedAt": "2018-01-01T00:00:00.000Z",
                        "updatedAt": "2018-01-02T00:00:00.000Z",
                        "likeCount": 7336
                    }
                }
            }
        }))
        .unwrap();

        let video = VideoKey::from("v1");
        let comment = thread.to_video_comment(&video);
        assert_eq!(comment.external_id, "comment1234");
        assert_eq!(comment.video_key, video);
        assert_eq!(comment.comment_raw, "Original text");
        assert_eq!(comment.comment_rich, "Display text");
        assert!(comment.updated_at > comment.published_at);
        assert!(!comment.analysis_complete());
    }
}
