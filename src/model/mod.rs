//! The normalized feed model.
//!
//! Every decoded document becomes a [`Feed`] and every entry within it an
//! [`Item`]. Both are tagged unions over the raw per-format values; callers
//! work through the capability traits below and rarely need to look at the
//! variant.

mod date;
mod feed;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use date::{parse_datetime, Timestamp, EPOCH};
pub use feed::{latest_update, Feed, Item, ItemSource};

/// Which syndication format a feed or item was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "RSS")]
    Rss,
    #[serde(rename = "Atom")]
    Atom,
    #[serde(rename = "JSONFeed")]
    JsonFeed,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceType::Rss => "RSS",
            SourceType::Atom => "Atom",
            SourceType::JsonFeed => "JSONFeed",
        })
    }
}

/// A representative image for a feed or an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Image {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.is_empty()).then_some(title);
        self
    }
}

/// Fields shared by feeds and items.
///
/// Accessors never fail: absent strings are empty, absent lists are empty and
/// absent dates are [`EPOCH`].
pub trait Metadata {
    fn title(&self) -> String;
    fn description(&self) -> String;
    fn link(&self) -> String;
    fn published(&self) -> DateTime<Utc>;
    fn updated(&self) -> DateTime<Utc>;
    /// Display strings, `"Name"` or `"Name (email)"`.
    fn authors(&self) -> Vec<String>;
    fn contributors(&self) -> Vec<String>;
    fn rights(&self) -> String;
    fn categories(&self) -> Vec<String>;
    fn language(&self) -> String;
    fn image(&self) -> Option<Image>;
}

/// Item-only fields.
pub trait ItemMetadata: Metadata {
    /// A stable identifier. Falls back to a content hash when the source
    /// carries none.
    fn id(&self) -> String;
    fn content(&self) -> String;
}

/// Feed-only fields.
pub trait FeedMetadata: Metadata {
    type Entry: ItemMetadata + Clone;

    /// The URL the feed document lives at.
    fn source_url(&self) -> String;
    fn set_source_url(&mut self, url: &str);
    fn set_image(&mut self, image: Image);
    fn entries(&self) -> &[Self::Entry];

    /// How often the publisher refreshes the feed, when it can be told.
    fn update_interval(&self) -> Option<Duration> {
        estimate_interval(self.entries().iter().map(Metadata::published))
    }
}

/// Formats a person as `"Name"` or `"Name (email)"`.
pub fn format_person(name: &str, email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => format!("{name} ({email})"),
        None => name.to_owned(),
    }
}

/// Mean gap between dated entries. `None` with fewer than two dated entries.
pub(crate) fn estimate_interval(dates: impl Iterator<Item = DateTime<Utc>>) -> Option<Duration> {
    let mut dates: Vec<DateTime<Utc>> = dates.filter(|d| *d != EPOCH).collect();
    if dates.len() < 2 {
        return None;
    }
    dates.sort_unstable();
    let first = *dates.first()?;
    let last = *dates.last()?;
    let gaps = i32::try_from(dates.len() - 1).ok()?;
    let mean = (last - first) / gaps;
    mean.to_std().ok().filter(|d| !d.is_zero())
}
