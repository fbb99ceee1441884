//! Bytes to normalized feed.
//!
//! Each decoder picks the [`Feed`] variant itself; nothing downstream ever
//! guesses the format from content. Validation runs on every decoded feed but
//! only [`Decoded::into_strict`] turns its failures into an error.

use thiserror::Error;

use crate::classify::Format;
use crate::format::{atom, jsonfeed, rss, XmlError};
use crate::model::{Feed, SourceType};
use crate::validate::ValidationErrors;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed XML: {0}")]
    Xml(#[from] XmlError),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected <{expected}> root element, found <{found}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    #[error("document has no <{0}> element")]
    MissingElement(&'static str),

    #[error("{0} is not a feed format")]
    NotAFeed(Format),

    #[error("feed failed validation: {0}")]
    Invalid(ValidationErrors),
}

impl DecodeError {
    /// Whether the document itself was unreadable, as opposed to readable but
    /// not a valid feed.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            DecodeError::Xml(_) | DecodeError::Json(_) | DecodeError::MissingElement(_)
        )
    }
}

/// A decoded feed and the outcome of validating it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub feed: Feed,
    /// `None` when the feed passed validation.
    pub validation: Option<ValidationErrors>,
}

impl Decoded {
    fn new(feed: Feed) -> Self {
        let validation = feed.validate().err();
        if let Some(errors) = &validation {
            tracing::debug!(
                source_type = %feed.source_type(),
                failures = errors.len(),
                errors = %errors,
                "Decoded feed failed validation"
            );
        }
        Self { feed, validation }
    }

    pub fn is_valid(&self) -> bool {
        self.validation.is_none()
    }

    /// The feed, or [`DecodeError::Invalid`] when validation failed.
    pub fn into_strict(self) -> Result<Feed, DecodeError> {
        match self.validation {
            None => Ok(self.feed),
            Some(errors) => Err(DecodeError::Invalid(errors)),
        }
    }

    pub fn into_parts(self) -> (Feed, Option<ValidationErrors>) {
        (self.feed, self.validation)
    }
}

pub fn decode_rss(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let channel = rss::Channel::from_xml(bytes)?;
    Ok(Decoded::new(Feed::Rss(channel)))
}

pub fn decode_atom(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let feed = atom::Feed::from_xml(bytes)?;
    Ok(Decoded::new(Feed::Atom(feed)))
}

pub fn decode_json_feed(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let feed = jsonfeed::Feed::from_json(bytes)?;
    Ok(Decoded::new(Feed::JsonFeed(feed)))
}

/// Decodes `bytes` as the given source type.
pub fn decode_source(source_type: SourceType, bytes: &[u8]) -> Result<Decoded, DecodeError> {
    match source_type {
        SourceType::Rss => decode_rss(bytes),
        SourceType::Atom => decode_atom(bytes),
        SourceType::JsonFeed => decode_json_feed(bytes),
    }
}

/// Decodes `bytes` as a classified format. HTML is not a feed.
pub fn decode(format: Format, bytes: &[u8]) -> Result<Decoded, DecodeError> {
    match format.source_type() {
        Some(source_type) => decode_source(source_type, bytes),
        None => Err(DecodeError::NotAFeed(format)),
    }
}

/// Wraps an already-built raw feed without decoding, still validating it.
pub fn decode_feed_from_source(source: impl Into<Feed>) -> Decoded {
    Decoded::new(source.into())
}
