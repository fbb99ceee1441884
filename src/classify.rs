//! Decides what a fetched body is from its `Content-Type` header, sniffing
//! generic XML bodies for their root element.

use std::fmt;

use thiserror::Error;

use crate::model::SourceType;

/// Bytes of a generic XML body inspected when sniffing.
pub const SNIFF_WINDOW: usize = 8 * 1024;

pub const MIME_TYPES_RSS: &[&str] = &["application/rss+xml", "application/rdf+xml"];
pub const MIME_TYPES_ATOM: &[&str] = &["application/atom+xml"];
pub const MIME_TYPES_JSON_FEED: &[&str] = &["application/feed+json", "application/json"];
pub const MIME_TYPES_HTML: &[&str] = &["text/html", "application/xhtml+xml"];
pub const MIME_TYPES_XML: &[&str] = &["application/xml", "text/xml"];

/// What a response body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Rss,
    Atom,
    JsonFeed,
    Html,
}

impl Format {
    /// The feed format, `None` for HTML.
    pub fn source_type(self) -> Option<SourceType> {
        match self {
            Format::Rss => Some(SourceType::Rss),
            Format::Atom => Some(SourceType::Atom),
            Format::JsonFeed => Some(SourceType::JsonFeed),
            Format::Html => None,
        }
    }
}

impl From<SourceType> for Format {
    fn from(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Rss => Format::Rss,
            SourceType::Atom => Format::Atom,
            SourceType::JsonFeed => Format::JsonFeed,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_type() {
            Some(source_type) => source_type.fmt(f),
            None => f.write_str("HTML"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("response has no Content-Type")]
    MissingContentType,

    #[error("unsupported content type: {0}")]
    Unsupported(String),
}

/// The media type of a `Content-Type` value: up to `;`, trimmed, lowercased.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a media type is one of the feed types, including generic XML.
pub fn is_feed_media_type(media_type: &str) -> bool {
    [MIME_TYPES_RSS, MIME_TYPES_ATOM, MIME_TYPES_JSON_FEED, MIME_TYPES_XML]
        .iter()
        .any(|types| types.contains(&media_type))
}

/// Classifies a response body.
///
/// # Examples
///
/// ```
/// use feedsift::classify::{classify, Format};
///
/// let body = b"<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"/>";
/// assert_eq!(classify(Some("text/xml; charset=utf-8"), body), Ok(Format::Atom));
/// assert_eq!(classify(Some("application/rss+xml"), b""), Ok(Format::Rss));
/// ```
pub fn classify(content_type: Option<&str>, body: &[u8]) -> Result<Format, ClassifyError> {
    let media = content_type.map(media_type).unwrap_or_default();
    if media.is_empty() {
        return Err(ClassifyError::MissingContentType);
    }

    let media = media.as_str();
    if MIME_TYPES_RSS.contains(&media) {
        return Ok(Format::Rss);
    }
    if MIME_TYPES_ATOM.contains(&media) {
        return Ok(Format::Atom);
    }
    if MIME_TYPES_JSON_FEED.contains(&media) {
        return Ok(Format::JsonFeed);
    }
    if MIME_TYPES_HTML.contains(&media) {
        return Ok(Format::Html);
    }
    if MIME_TYPES_XML.contains(&media) {
        return sniff_xml(body).ok_or_else(|| ClassifyError::Unsupported(media.to_owned()));
    }

    Err(ClassifyError::Unsupported(media.to_owned()))
}

/// Earliest of `<rss`, `<rdf:RDF` or `<feed` within the sniff window.
fn sniff_xml(body: &[u8]) -> Option<Format> {
    let window = &body[..body.len().min(SNIFF_WINDOW)];
    let rss = [find(window, b"<rss"), find(window, b"<rdf:RDF")]
        .into_iter()
        .flatten()
        .min();
    let atom = find(window, b"<feed");

    match (rss, atom) {
        (Some(r), Some(a)) if a < r => Some(Format::Atom),
        (Some(_), _) => Some(Format::Rss),
        (None, Some(_)) => Some(Format::Atom),
        (None, None) => None,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_types() {
        assert_eq!(classify(Some("application/rss+xml"), b""), Ok(Format::Rss));
        assert_eq!(classify(Some("application/rdf+xml"), b""), Ok(Format::Rss));
        assert_eq!(classify(Some("application/atom+xml"), b""), Ok(Format::Atom));
        assert_eq!(classify(Some("application/feed+json"), b""), Ok(Format::JsonFeed));
        assert_eq!(classify(Some("application/json"), b""), Ok(Format::JsonFeed));
        assert_eq!(classify(Some("text/html"), b""), Ok(Format::Html));
        assert_eq!(classify(Some("application/xhtml+xml"), b""), Ok(Format::Html));
    }

    #[test]
    fn test_parameters_and_case_ignored() {
        assert_eq!(
            classify(Some("  Text/HTML ; charset=UTF-8"), b""),
            Ok(Format::Html)
        );
    }

    #[test]
    fn test_generic_xml_sniffs_root() {
        let rss = b"<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel/></rss>";
        let rdf = b"<?xml version=\"1.0\"?><rdf:RDF xmlns:rdf=\"x\"/>";
        let atom = b"<?xml version=\"1.0\"?><feed xmlns=\"http://www.w3.org/2005/Atom\"/>";
        assert_eq!(classify(Some("application/xml"), rss), Ok(Format::Rss));
        assert_eq!(classify(Some("text/xml"), rdf), Ok(Format::Rss));
        assert_eq!(classify(Some("text/xml"), atom), Ok(Format::Atom));
    }

    #[test]
    fn test_earliest_marker_wins() {
        // An RSS document that mentions <feed in an item body.
        let body = b"<rss><channel><description>&lt;feed</description><feed/></channel></rss>";
        assert_eq!(classify(Some("application/xml"), body), Ok(Format::Rss));
        let body = b"<feed><content>see <rss tags</content></feed>";
        assert_eq!(classify(Some("application/xml"), body), Ok(Format::Atom));
    }

    #[test]
    fn test_sniff_window_limit() {
        let mut body = vec![b' '; SNIFF_WINDOW];
        body.extend_from_slice(b"<rss>");
        assert_eq!(
            classify(Some("application/xml"), &body),
            Err(ClassifyError::Unsupported("application/xml".into()))
        );
    }

    #[test]
    fn test_generic_xml_without_marker() {
        assert_eq!(
            classify(Some("text/xml"), b"<sitemap/>"),
            Err(ClassifyError::Unsupported("text/xml".into()))
        );
    }

    #[test]
    fn test_missing_content_type() {
        assert_eq!(classify(None, b"<rss/>"), Err(ClassifyError::MissingContentType));
        assert_eq!(
            classify(Some("  "), b"<rss/>"),
            Err(ClassifyError::MissingContentType)
        );
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(
            classify(Some("image/png"), b""),
            Err(ClassifyError::Unsupported("image/png".into()))
        );
    }

    #[test]
    fn test_is_feed_media_type() {
        assert!(is_feed_media_type("application/atom+xml"));
        assert!(is_feed_media_type("text/xml"));
        assert!(!is_feed_media_type("text/html"));
    }
}
