//! Client for the YouTube Data API.
//!
//! Covers the reads the pipeline needs: keyword search, video details,
//! top-level comments and caption transcripts. Video references pasted by
//! users are normalized to bare ids with [`parse_video_reference`].

pub mod captions;
pub mod client;
pub mod error;
pub mod reference;
pub mod types;

pub use captions::transcript_from_xml;
pub use client::{
    CommentOrder, CommentQuery, MediaClient, YouTubeClient, YouTubeConfig,
    COMMENT_THREADS_MAX_RESULTS, SEARCH_MAX_RESULTS, VIDEOS_PER_REQUEST,
};
pub use error::{MediaError, MediaResult};
pub use reference::parse_video_reference;
pub use types::{CommentThread, VideoDetail};

#[cfg(any(test, feature = "mock"))]
pub use client::MockMediaClient;
