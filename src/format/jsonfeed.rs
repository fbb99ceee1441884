//! JSON Feed 1.0 and 1.1 documents.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::{clean_text, clean_url, stable_id};
use crate::decode::DecodeError;
use crate::model::{FeedMetadata, Image, ItemMetadata, Metadata, Timestamp, EPOCH};
use crate::validate::{rule, Validate, ValidationErrors, Validator};

const VERSION_PREFIX: &str = "https://jsonfeed.org/version/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A JSON Feed top-level object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// JSON Feed 1.0 single author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Usually a string; some 1.0 feeds use numbers.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub authors: Vec<Author>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// `null` reads as the field's zero value, like an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("invalid item id: {other}"))),
    }
}

fn clean_in_place(field: &mut Option<String>, clean: fn(&str) -> Option<String>) {
    *field = field.as_deref().and_then(clean);
}

impl Author {
    fn sanitize(&mut self) {
        clean_in_place(&mut self.name, clean_text);
        clean_in_place(&mut self.url, clean_url);
        clean_in_place(&mut self.avatar, clean_url);
    }
}

fn author_names(single: Option<&Author>, many: &[Author]) -> Vec<String> {
    single
        .into_iter()
        .chain(many)
        .filter_map(|a| a.name.clone())
        .collect()
}

impl Feed {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut feed: Feed = serde_json::from_slice(bytes)?;
        feed.sanitize();
        Ok(feed)
    }

    fn sanitize(&mut self) {
        self.version = clean_url(&self.version).unwrap_or_default();
        self.title = clean_text(&self.title).unwrap_or_default();
        clean_in_place(&mut self.home_page_url, clean_url);
        clean_in_place(&mut self.feed_url, clean_url);
        clean_in_place(&mut self.description, clean_text);
        clean_in_place(&mut self.user_comment, clean_text);
        clean_in_place(&mut self.next_url, clean_url);
        clean_in_place(&mut self.icon, clean_url);
        clean_in_place(&mut self.favicon, clean_url);
        clean_in_place(&mut self.language, clean_text);
        if let Some(author) = &mut self.author {
            author.sanitize();
        }
        self.authors.iter_mut().for_each(Author::sanitize);
        self.items.iter_mut().for_each(Item::sanitize);
    }
}

impl Item {
    fn sanitize(&mut self) {
        self.id = clean_url(&self.id).unwrap_or_default();
        clean_in_place(&mut self.url, clean_url);
        clean_in_place(&mut self.external_url, clean_url);
        clean_in_place(&mut self.title, clean_text);
        clean_in_place(&mut self.content_html, clean_text);
        clean_in_place(&mut self.content_text, clean_text);
        clean_in_place(&mut self.summary, clean_text);
        clean_in_place(&mut self.image, clean_url);
        clean_in_place(&mut self.banner_image, clean_url);
        clean_in_place(&mut self.language, clean_text);
        if let Some(author) = &mut self.author {
            author.sanitize();
        }
        self.authors.iter_mut().for_each(Author::sanitize);
        self.tags = self.tags.iter().filter_map(|t| clean_text(t)).collect();
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.date_published.as_ref().and_then(Timestamp::value)
    }
}

impl Metadata for Feed {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn description(&self) -> String {
        self.description.clone().unwrap_or_default()
    }

    fn link(&self) -> String {
        self.home_page_url.clone().unwrap_or_default()
    }

    /// Latest item publication date.
    fn published(&self) -> DateTime<Utc> {
        self.items
            .iter()
            .map(Metadata::published)
            .max()
            .unwrap_or(EPOCH)
    }

    /// Latest item modification date.
    fn updated(&self) -> DateTime<Utc> {
        self.items
            .iter()
            .map(Metadata::updated)
            .max()
            .unwrap_or(EPOCH)
    }

    fn authors(&self) -> Vec<String> {
        author_names(self.author.as_ref(), &self.authors)
    }

    fn contributors(&self) -> Vec<String> {
        Vec::new()
    }

    fn rights(&self) -> String {
        String::new()
    }

    fn categories(&self) -> Vec<String> {
        Vec::new()
    }

    fn language(&self) -> String {
        self.language.clone().unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        self.icon
            .as_ref()
            .or(self.favicon.as_ref())
            .map(|url| Image::new(url).with_title(&self.title))
    }
}

impl FeedMetadata for Feed {
    type Entry = Item;

    fn source_url(&self) -> String {
        self.feed_url.clone().unwrap_or_default()
    }

    fn set_source_url(&mut self, url: &str) {
        self.feed_url = Some(url.to_owned());
    }

    fn set_image(&mut self, image: Image) {
        self.icon = Some(image.url);
    }

    fn entries(&self) -> &[Item] {
        &self.items
    }
}

impl Metadata for Item {
    fn title(&self) -> String {
        self.title.clone().unwrap_or_default()
    }

    fn description(&self) -> String {
        self.summary.clone().unwrap_or_default()
    }

    fn link(&self) -> String {
        self.url
            .clone()
            .or_else(|| self.external_url.clone())
            .unwrap_or_default()
    }

    fn published(&self) -> DateTime<Utc> {
        self.published_at().unwrap_or(EPOCH)
    }

    fn updated(&self) -> DateTime<Utc> {
        Timestamp::or_epoch(self.date_modified.as_ref())
    }

    fn authors(&self) -> Vec<String> {
        author_names(self.author.as_ref(), &self.authors)
    }

    fn contributors(&self) -> Vec<String> {
        Vec::new()
    }

    fn rights(&self) -> String {
        String::new()
    }

    fn categories(&self) -> Vec<String> {
        self.tags.clone()
    }

    fn language(&self) -> String {
        self.language.clone().unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        self.image
            .as_ref()
            .or(self.banner_image.as_ref())
            .map(|url| Image::new(url).with_title(self.title()))
    }
}

impl ItemMetadata for Item {
    fn id(&self) -> String {
        stable_id(
            Some(self.id.as_str()),
            &self.link(),
            &self.title(),
            self.published_at(),
        )
    }

    fn content(&self) -> String {
        self.content_html
            .clone()
            .or_else(|| self.content_text.clone())
            .unwrap_or_default()
    }
}

impl Validate for Feed {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        if v.required("Feed.Version", &self.version) && !self.version.starts_with(VERSION_PREFIX) {
            v.fail("Feed.Version", rule::JSONFEED_VERSION);
        }
        v.required("Feed.Title", &self.title);
        for item in &self.items {
            v.merge(item.validate());
        }
        v.finish()
    }
}

impl Validate for Item {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.required("Item.ID", &self.id);
        if self.content_html.is_none() && self.content_text.is_none() {
            v.fail("Item.ContentHTML", rule::REQUIRED_WITHOUT);
        }
        v.datetime("Item.DatePublished", self.date_published.as_ref());
        v.datetime("Item.DateModified", self.date_modified.as_ref());
        v.finish()
    }
}
