//! Raw per-format feed structures and their decoders.
//!
//! Each submodule maps one syndication format into plain structs that mirror
//! the document, with text already sanitized. The normalized surface lives in
//! [`crate::model`].

pub mod atom;
pub mod ext;
pub mod jsonfeed;
pub mod rss;
pub(crate) mod xml;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::model::Timestamp;
use crate::sanitize::sanitize;
use crate::util::strip_control_chars;

use xml::Element;

pub use xml::XmlError;

/// Namespace matcher. An element matches when it is bound to one of `uris`,
/// or when it is unbound and carries exactly `prefix` (`None` meaning
/// unprefixed).
#[derive(Debug)]
pub(crate) struct Ns {
    uris: &'static [&'static str],
    prefix: Option<&'static str>,
}

impl Ns {
    pub(crate) fn matches(&self, ns: Option<&str>, prefix: Option<&str>) -> bool {
        match ns {
            Some(uri) => self.uris.contains(&uri),
            None => prefix == self.prefix,
        }
    }
}

pub(crate) const RSS: Ns = Ns {
    uris: &[
        "http://purl.org/rss/1.0/",
        "http://my.netscape.com/rdf/simple/0.9/",
        "http://backend.userland.com/rss2",
    ],
    prefix: None,
};

pub(crate) const RDF: Ns = Ns {
    uris: &["http://www.w3.org/1999/02/22-rdf-syntax-ns#"],
    prefix: Some("rdf"),
};

pub(crate) const ATOM: Ns = Ns {
    uris: &["http://www.w3.org/2005/Atom", "http://purl.org/atom/ns#"],
    prefix: None,
};

/// Atom elements embedded in another format.
pub(crate) const ATOM_EXT: Ns = Ns {
    uris: &["http://www.w3.org/2005/Atom"],
    prefix: Some("atom"),
};

pub(crate) const DC: Ns = Ns {
    uris: &["http://purl.org/dc/elements/1.1/", "http://purl.org/dc/terms/"],
    prefix: Some("dc"),
};

pub(crate) const CONTENT: Ns = Ns {
    uris: &["http://purl.org/rss/1.0/modules/content/"],
    prefix: Some("content"),
};

pub(crate) const MEDIA: Ns = Ns {
    uris: &["http://search.yahoo.com/mrss/", "http://search.yahoo.com/mrss"],
    prefix: Some("media"),
};

pub(crate) const SY: Ns = Ns {
    uris: &["http://purl.org/rss/1.0/modules/syndication/"],
    prefix: Some("sy"),
};

pub(crate) const XML: Ns = Ns {
    uris: &["http://www.w3.org/XML/1998/namespace"],
    prefix: Some("xml"),
};

/// Sanitized text of a child element, `None` when missing or blank.
pub(crate) fn text_of(el: &Element, ns: &Ns, local: &str) -> Option<String> {
    el.child(ns, local).and_then(|c| clean_text(&c.text()))
}

/// Sanitized text of every matching child, blanks dropped.
pub(crate) fn texts_of(el: &Element, ns: &Ns, local: &str) -> Vec<String> {
    el.children(ns, local)
        .filter_map(|c| clean_text(&c.text()))
        .collect()
}

/// Trimmed URL text of a child element.
pub(crate) fn url_of(el: &Element, ns: &Ns, local: &str) -> Option<String> {
    el.child(ns, local).and_then(|c| clean_url(&c.text()))
}

pub(crate) fn date_of(el: &Element, ns: &Ns, local: &str) -> Option<Timestamp> {
    el.child(ns, local)
        .map(|c| c.text())
        .filter(|t| !t.trim().is_empty())
        .map(|t| Timestamp::parse(&t))
}

pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let text = sanitize(raw);
    (!text.is_empty()).then_some(text)
}

/// URLs are not HTML, so they only lose control characters and padding.
pub(crate) fn clean_url(raw: &str) -> Option<String> {
    let url = strip_control_chars(raw).trim().to_owned();
    (!url.is_empty()).then_some(url)
}

/// A stable identifier for an entry: its own id when it has one, otherwise
/// a SHA-256 over link, title and publication time.
pub(crate) fn stable_id(
    existing: Option<&str>,
    link: &str,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link,
        title,
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

/// Whether a media type names an image.
pub(crate) fn is_image_type(mime: Option<&str>) -> bool {
    mime.is_some_and(|m| m.trim().to_ascii_lowercase().starts_with("image/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_prefers_existing() {
        assert_eq!(stable_id(Some("  guid-1 "), "l", "t", None), "guid-1");
    }

    #[test]
    fn test_stable_id_hash_is_deterministic() {
        let a = stable_id(None, "https://example.com/1", "Title", None);
        let b = stable_id(Some("   "), "https://example.com/1", "Title", None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, stable_id(None, "https://example.com/2", "Title", None));
    }

    #[test]
    fn test_ns_matching() {
        assert!(DC.matches(Some("http://purl.org/dc/elements/1.1/"), Some("x")));
        assert!(DC.matches(None, Some("dc")));
        assert!(!DC.matches(None, None));
        assert!(RSS.matches(None, None));
        assert!(!RSS.matches(None, Some("dc")));
        assert!(!RSS.matches(Some("http://www.w3.org/2005/Atom"), None));
    }

    #[test]
    fn test_is_image_type() {
        assert!(is_image_type(Some("image/png")));
        assert!(is_image_type(Some(" IMAGE/JPEG")));
        assert!(!is_image_type(Some("audio/mpeg")));
        assert!(!is_image_type(None));
    }
}
