//! Mapping between entities and Firestore documents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use yj_models::{
    CommentKey, CommentPatch, SentimentAnalysis, Video, VideoComment, VideoKey, VideoPatch,
};

use crate::error::{StoreError, StoreResult};
use crate::types::{Document, FieldReader, FromFirestoreValue, ToFirestoreValue, Value};

pub const VIDEOS: &str = "videos";
pub const COMMENTS: &str = "video_comments";

type Fields = HashMap<String, Value>;

fn analysis_value(analysis: &Option<SentimentAnalysis>) -> StoreResult<Value> {
    Ok(match analysis {
        Some(a) => serde_json::to_value(a)?.to_firestore_value(),
        None => Value::NullValue(()),
    })
}

fn read_analysis(reader: &FieldReader<'_>, field: &str) -> StoreResult<Option<SentimentAnalysis>> {
    match reader.opt::<serde_json::Value>(field)? {
        Some(json) => Ok(Some(serde_json::from_value(json)?)),
        None => Ok(None),
    }
}

fn insert(fields: &mut Fields, name: &str, value: impl ToFirestoreValue) {
    fields.insert(name.to_string(), value.to_firestore_value());
}

fn doc_key(doc: &Document) -> StoreResult<String> {
    doc.id()
        .map(str::to_string)
        .ok_or_else(|| StoreError::invalid_document("document has no name"))
}

pub fn video_fields(video: &Video) -> StoreResult<Fields> {
    let mut f = Fields::new();
    insert(&mut f, "external_id", video.external_id.as_str());
    insert(&mut f, "title", video.title.as_str());
    insert(&mut f, "description", video.description.as_str());
    insert(&mut f, "transcript", video.transcript.as_str());
    f.insert(
        "analyzed_transcript".to_string(),
        analysis_value(&video.analyzed_transcript)?,
    );
    insert(&mut f, "transcript_failed", video.transcript_failed);
    insert(&mut f, "sentiment_score", video.sentiment_score);
    insert(&mut f, "sentiment_magnitude", video.sentiment_magnitude);
    insert(&mut f, "published_at", video.published_at);
    insert(&mut f, "thumbnail_default", video.thumbnail_default.as_str());
    insert(&mut f, "thumbnail_medium", video.thumbnail_medium.as_str());
    insert(&mut f, "thumbnail_high", video.thumbnail_high.as_str());
    insert(&mut f, "likes", video.likes);
    insert(&mut f, "dislikes", video.dislikes);
    insert(&mut f, "comment_count", video.comment_count);
    insert(&mut f, "created_at", video.created_at);
    Ok(f)
}

pub fn video_from_document(doc: &Document) -> StoreResult<Video> {
    let r = doc.reader();
    Ok(Video {
        key: VideoKey::from(doc_key(doc)?),
        external_id: r.get("external_id")?,
        title: r.get("title")?,
        description: r.or_default("description")?,
        transcript: r.or_default("transcript")?,
        analyzed_transcript: read_analysis(&r, "analyzed_transcript")?,
        transcript_failed: r.or_default("transcript_failed")?,
        sentiment_score: r.or_default("sentiment_score")?,
        sentiment_magnitude: r.or_default("sentiment_magnitude")?,
        published_at: r.get("published_at")?,
        thumbnail_default: r.or_default("thumbnail_default")?,
        thumbnail_medium: r.or_default("thumbnail_medium")?,
        thumbnail_high: r.or_default("thumbnail_high")?,
        likes: r.or_default("likes")?,
        dislikes: r.or_default("dislikes")?,
        comment_count: r.or_default("comment_count")?,
        created_at: r
            .opt::<DateTime<Utc>>("created_at")?
            .or_else(|| doc.create_time.as_ref().and_then(|t| parse_time(t)))
            .unwrap_or_else(Utc::now),
    })
}

pub fn video_patch_fields(patch: &VideoPatch) -> StoreResult<Fields> {
    let mut f = Fields::new();
    match patch {
        VideoPatch::Transcript(text) => {
            insert(&mut f, "transcript", text.as_str());
            insert(&mut f, "transcript_failed", false);
        }
        VideoPatch::TranscriptFailed => insert(&mut f, "transcript_failed", true),
        VideoPatch::Sentiment(analysis) => {
            f.insert(
                "analyzed_transcript".to_string(),
                analysis_value(&Some(analysis.clone()))?,
            );
            insert(&mut f, "sentiment_score", analysis.score());
            insert(&mut f, "sentiment_magnitude", analysis.magnitude());
        }
    }
    Ok(f)
}

pub fn comment_fields(comment: &VideoComment) -> StoreResult<Fields> {
    let mut f = Fields::new();
    insert(&mut f, "video_key", comment.video_key.as_str());
    insert(&mut f, "external_id", comment.external_id.as_str());
    insert(&mut f, "author_display_name", comment.author_display_name.as_str());
    insert(
        &mut f,
        "author_profile_image_url",
        comment.author_profile_image_url.as_str(),
    );
    insert(&mut f, "comment_raw", comment.comment_raw.as_str());
    insert(&mut f, "comment_rich", comment.comment_rich.as_str());
    insert(&mut f, "published_at", comment.published_at);
    insert(&mut f, "updated_at", comment.updated_at);
    f.insert(
        "analyzed_comment".to_string(),
        analysis_value(&comment.analyzed_comment)?,
    );
    insert(&mut f, "analysis_failed", comment.analysis_failed);
    insert(&mut f, "sentiment_score", comment.sentiment_score);
    insert(&mut f, "sentiment_magnitude", comment.sentiment_magnitude);
    Ok(f)
}

pub fn comment_from_document(doc: &Document) -> StoreResult<VideoComment> {
    let r = doc.reader();
    Ok(VideoComment {
        key: CommentKey::from(doc_key(doc)?),
        video_key: VideoKey::from(r.get::<String>("video_key")?),
        external_id: r.get("external_id")?,
        author_display_name: r.or_default("author_display_name")?,
        author_profile_image_url: r.or_default("author_profile_image_url")?,
        comment_raw: r.get("comment_raw")?,
        comment_rich: r.or_default("comment_rich")?,
        published_at: r.get("published_at")?,
        updated_at: r.get("updated_at")?,
        analyzed_comment: read_analysis(&r, "analyzed_comment")?,
        analysis_failed: r.or_default("analysis_failed")?,
        sentiment_score: r.or_default("sentiment_score")?,
        sentiment_magnitude: r.or_default("sentiment_magnitude")?,
    })
}

pub fn comment_patch_fields(patch: &CommentPatch) -> StoreResult<Fields> {
    let mut f = Fields::new();
    match patch {
        CommentPatch::Sentiment(analysis) => {
            f.insert(
                "analyzed_comment".to_string(),
                analysis_value(&Some(analysis.clone()))?,
            );
            insert(&mut f, "sentiment_score", analysis.score());
            insert(&mut f, "sentiment_magnitude", analysis.magnitude());
            insert(&mut f, "analysis_failed", false);
        }
        CommentPatch::AnalysisFailed => insert(&mut f, "analysis_failed", true),
    }
    Ok(f)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_firestore_value(&Value::TimestampValue(s.to_string()))
}
