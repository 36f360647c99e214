//! Timed-text caption XML.

use crate::error::{MediaError, MediaResult};

/// Flatten a timed-text document into plain transcript text.
///
/// The text of every `<text>` element is trimmed and joined with a single
/// space. Returns `None` when the document holds no text.
pub fn transcript_from_xml(xml: &str) -> MediaResult<Option<String>> {
    if xml.trim().is_empty() {
        return Ok(None);
    }

    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| MediaError::invalid_response(format!("caption XML: {}", e)))?;

    let lines: Vec<String> = doc
        .descendants()
        .filter(|n| n.has_tag_name("text"))
        .map(|n| {
            n.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join(" ")))
    }
}
