//! Video references as users paste them: a watch URL or a bare id.

use url::Url;

use crate::error::{MediaError, MediaResult};

const ID_LEN: usize = 11;

fn is_video_id(s: &str) -> bool {
    s.len() == ID_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.").trim_start_matches("m.");
    host == "youtube.com" || host == "youtu.be" || host == "music.youtube.com"
}

/// Extract the 11-character video id from `reference`.
///
/// Accepts a bare id and these URL forms:
/// - `https://www.youtube.com/watch?v=ID`
/// - `https://youtu.be/ID`
/// - `https://www.youtube.com/embed/ID`, `/v/ID`, `/shorts/ID`, `/live/ID`
pub fn parse_video_reference(reference: &str) -> MediaResult<String> {
    let reference = reference.trim();
    if is_video_id(reference) {
        return Ok(reference.to_string());
    }

    let url = Url::parse(reference)
        .or_else(|_| Url::parse(&format!("https://{}", reference)))
        .map_err(|_| MediaError::invalid_reference(reference))?;

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !is_youtube_host(&host) {
        return Err(MediaError::invalid_reference(reference));
    }

    let mut segments = url.path_segments().into_iter().flatten().filter(|s| !s.is_empty());
    let candidate = if host.ends_with("youtu.be") {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("embed" | "v" | "shorts" | "live") => segments.next().map(str::to_string),
            _ => None,
        }
    };

    candidate
        .filter(|id| is_video_id(id))
        .ok_or_else(|| MediaError::invalid_reference(reference))
}
