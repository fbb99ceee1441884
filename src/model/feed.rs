use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FeedMetadata, Image, ItemMetadata, Metadata, SourceType, EPOCH};
use crate::format::{atom, jsonfeed, rss};
use crate::validate::{Validate, ValidationErrors};

/// Runs `$body` with `$inner` bound to whichever payload the union holds.
macro_rules! dispatch {
    ($value:expr, $union:ident, $inner:ident => $body:expr) => {
        match $value {
            $union::Rss($inner) => $body,
            $union::Atom($inner) => $body,
            $union::JsonFeed($inner) => $body,
        }
    };
}

/// A decoded feed of any supported format.
///
/// Persisted as `{"type": "RSS" | "Atom" | "JSONFeed", "source": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "source")]
pub enum Feed {
    #[serde(rename = "RSS")]
    Rss(rss::Channel),
    #[serde(rename = "Atom")]
    Atom(atom::Feed),
    #[serde(rename = "JSONFeed")]
    JsonFeed(jsonfeed::Feed),
}

impl Feed {
    pub fn source_type(&self) -> SourceType {
        match self {
            Feed::Rss(_) => SourceType::Rss,
            Feed::Atom(_) => SourceType::Atom,
            Feed::JsonFeed(_) => SourceType::JsonFeed,
        }
    }

    pub fn source_url(&self) -> String {
        dispatch!(self, Feed, f => f.source_url())
    }

    pub fn set_source_url(&mut self, url: &str) {
        dispatch!(self, Feed, f => f.set_source_url(url))
    }

    pub fn set_image(&mut self, image: Image) {
        dispatch!(self, Feed, f => f.set_image(image))
    }

    pub fn update_interval(&self) -> Option<Duration> {
        dispatch!(self, Feed, f => f.update_interval())
    }

    /// The feed's entries, each carrying a snapshot of the feed title.
    pub fn items(&self) -> Vec<Item> {
        let feed_title = self.title();
        match self {
            Feed::Rss(f) => collect_items(f.entries(), ItemSource::Rss, &feed_title),
            Feed::Atom(f) => collect_items(f.entries(), ItemSource::Atom, &feed_title),
            Feed::JsonFeed(f) => collect_items(f.entries(), ItemSource::JsonFeed, &feed_title),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        dispatch!(self, Feed, f => f.validate())
    }
}

fn collect_items<T: Clone>(
    entries: &[T],
    wrap: fn(T) -> ItemSource,
    feed_title: &str,
) -> Vec<Item> {
    entries
        .iter()
        .cloned()
        .map(|entry| Item::new(wrap(entry), feed_title))
        .collect()
}

impl Metadata for Feed {
    fn title(&self) -> String {
        dispatch!(self, Feed, f => f.title())
    }

    fn description(&self) -> String {
        dispatch!(self, Feed, f => f.description())
    }

    fn link(&self) -> String {
        dispatch!(self, Feed, f => f.link())
    }

    fn published(&self) -> DateTime<Utc> {
        dispatch!(self, Feed, f => f.published())
    }

    fn updated(&self) -> DateTime<Utc> {
        dispatch!(self, Feed, f => f.updated())
    }

    fn authors(&self) -> Vec<String> {
        dispatch!(self, Feed, f => f.authors())
    }

    fn contributors(&self) -> Vec<String> {
        dispatch!(self, Feed, f => f.contributors())
    }

    fn rights(&self) -> String {
        dispatch!(self, Feed, f => f.rights())
    }

    fn categories(&self) -> Vec<String> {
        dispatch!(self, Feed, f => f.categories())
    }

    fn language(&self) -> String {
        dispatch!(self, Feed, f => f.language())
    }

    fn image(&self) -> Option<Image> {
        dispatch!(self, Feed, f => f.image())
    }
}

impl From<rss::Channel> for Feed {
    fn from(channel: rss::Channel) -> Self {
        Feed::Rss(channel)
    }
}

impl From<atom::Feed> for Feed {
    fn from(feed: atom::Feed) -> Self {
        Feed::Atom(feed)
    }
}

impl From<jsonfeed::Feed> for Feed {
    fn from(feed: jsonfeed::Feed) -> Self {
        Feed::JsonFeed(feed)
    }
}

/// The raw entry behind an [`Item`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "source")]
pub enum ItemSource {
    #[serde(rename = "RSS")]
    Rss(rss::Item),
    #[serde(rename = "Atom")]
    Atom(atom::Entry),
    #[serde(rename = "JSONFeed")]
    JsonFeed(jsonfeed::Item),
}

/// One entry of a feed, with the title of the feed it came from.
///
/// Persisted as `{"type": ..., "source": {...}, "feed_title": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(flatten)]
    source: ItemSource,
    #[serde(default)]
    feed_title: String,
}

impl Item {
    pub fn new(source: ItemSource, feed_title: impl Into<String>) -> Self {
        Self {
            source,
            feed_title: feed_title.into(),
        }
    }

    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    pub fn source_type(&self) -> SourceType {
        match &self.source {
            ItemSource::Rss(_) => SourceType::Rss,
            ItemSource::Atom(_) => SourceType::Atom,
            ItemSource::JsonFeed(_) => SourceType::JsonFeed,
        }
    }

    pub fn feed_title(&self) -> &str {
        &self.feed_title
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        dispatch!(&self.source, ItemSource, i => i.validate())
    }
}

impl Metadata for Item {
    fn title(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.title())
    }

    fn description(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.description())
    }

    fn link(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.link())
    }

    fn published(&self) -> DateTime<Utc> {
        dispatch!(&self.source, ItemSource, i => i.published())
    }

    fn updated(&self) -> DateTime<Utc> {
        dispatch!(&self.source, ItemSource, i => i.updated())
    }

    fn authors(&self) -> Vec<String> {
        dispatch!(&self.source, ItemSource, i => i.authors())
    }

    fn contributors(&self) -> Vec<String> {
        dispatch!(&self.source, ItemSource, i => i.contributors())
    }

    fn rights(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.rights())
    }

    fn categories(&self) -> Vec<String> {
        dispatch!(&self.source, ItemSource, i => i.categories())
    }

    fn language(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.language())
    }

    fn image(&self) -> Option<Image> {
        dispatch!(&self.source, ItemSource, i => i.image())
    }
}

impl ItemMetadata for Item {
    fn id(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.id())
    }

    fn content(&self) -> String {
        dispatch!(&self.source, ItemSource, i => i.content())
    }
}

/// The most recent `updated` date among `items`, or [`EPOCH`].
pub fn latest_update(items: &[Item]) -> DateTime<Utc> {
    items
        .iter()
        .map(Metadata::updated)
        .max()
        .unwrap_or(EPOCH)
}
