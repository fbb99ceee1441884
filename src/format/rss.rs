//! RSS 2.0 and RSS 1.0 (RDF) documents.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ext::{media_contents, media_thumbnails, DublinCore, MediaContent, Syndication};
use super::xml::{self, Element};
use super::{
    clean_text, clean_url, date_of, is_image_type, stable_id, text_of, texts_of, url_of, ATOM_EXT,
    CONTENT, RDF, RSS,
};
use crate::decode::DecodeError;
use crate::model::{
    estimate_interval, FeedMetadata, Image, ItemMetadata, Metadata, Timestamp, EPOCH,
};
use crate::validate::{rule, Validate, ValidationErrors, Validator};

/// An RSS `<channel>` with its items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managing_editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Minutes between refreshes, as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ChannelImage>,
    /// `atom:link rel="self"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default)]
    pub dublin_core: DublinCore,
    #[serde(default)]
    pub syndication: Syndication,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_thumbnails: Vec<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// The channel `<image>` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guid {
    pub value: String,
    #[serde(default = "default_true")]
    pub is_permalink: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// An RSS `<item>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<Timestamp>,
    /// `content:encoded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub dublin_core: DublinCore,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_contents: Vec<MediaContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_thumbnails: Vec<String>,
}

impl Channel {
    /// Decodes an `<rss>` or `<rdf:RDF>` document.
    pub fn from_xml(bytes: &[u8]) -> Result<Self, DecodeError> {
        let root = xml::parse(bytes)?;

        if root.is(&RSS, "rss") {
            let channel = root
                .child(&RSS, "channel")
                .ok_or(DecodeError::MissingElement("channel"))?;
            let mut decoded = Channel::from_element(channel);
            decoded.version = root.attr("version").map(|v| v.trim().to_owned());
            return Ok(decoded);
        }

        if root.is(&RDF, "RDF") {
            let channel = root
                .child(&RSS, "channel")
                .ok_or(DecodeError::MissingElement("channel"))?;
            let mut decoded = Channel::from_element(channel);
            // RSS 1.0 keeps items and the image beside the channel.
            decoded
                .items
                .extend(root.children(&RSS, "item").map(Item::from_element));
            if decoded.image.is_none() {
                decoded.image = root.child(&RSS, "image").and_then(ChannelImage::from_element);
            }
            decoded.version = Some("1.0".to_owned());
            return Ok(decoded);
        }

        Err(DecodeError::UnexpectedRoot {
            expected: "rss",
            found: root.name,
        })
    }

    fn from_element(el: &Element) -> Self {
        Self {
            version: None,
            title: text_of(el, &RSS, "title").unwrap_or_default(),
            link: url_of(el, &RSS, "link").unwrap_or_default(),
            description: text_of(el, &RSS, "description").unwrap_or_default(),
            language: text_of(el, &RSS, "language"),
            copyright: text_of(el, &RSS, "copyright"),
            managing_editor: text_of(el, &RSS, "managingEditor"),
            pub_date: date_of(el, &RSS, "pubDate"),
            last_build_date: date_of(el, &RSS, "lastBuildDate"),
            categories: texts_of(el, &RSS, "category"),
            generator: text_of(el, &RSS, "generator"),
            ttl: el.child(&RSS, "ttl").map(|t| t.text().trim().to_owned()),
            image: el.child(&RSS, "image").and_then(ChannelImage::from_element),
            self_link: el
                .children(&ATOM_EXT, "link")
                .find(|l| l.attr("rel") == Some("self"))
                .and_then(|l| l.attr("href"))
                .and_then(clean_url),
            dublin_core: DublinCore::from_element(el),
            syndication: Syndication::from_element(el),
            media_thumbnails: media_thumbnails(el),
            items: el.children(&RSS, "item").map(Item::from_element).collect(),
        }
    }

    /// Minutes from `<ttl>`, when it is a positive integer.
    fn ttl_interval(&self) -> Option<Duration> {
        let minutes = self.ttl.as_deref()?.parse::<u64>().ok().filter(|m| *m > 0)?;
        Some(Duration::from_secs(minutes * 60))
    }
}

impl ChannelImage {
    fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            url: url_of(el, &RSS, "url")?,
            title: text_of(el, &RSS, "title"),
            link: url_of(el, &RSS, "link"),
        })
    }
}

impl Item {
    fn from_element(el: &Element) -> Self {
        Self {
            title: text_of(el, &RSS, "title"),
            link: url_of(el, &RSS, "link"),
            description: text_of(el, &RSS, "description"),
            author: text_of(el, &RSS, "author"),
            categories: texts_of(el, &RSS, "category"),
            comments: url_of(el, &RSS, "comments"),
            enclosure: el.child(&RSS, "enclosure").and_then(|e| {
                Some(Enclosure {
                    url: clean_url(e.attr("url")?)?,
                    length: e.attr("length").map(str::to_owned),
                    mime_type: e.attr("type").map(str::to_owned),
                })
            }),
            guid: el.child(&RSS, "guid").and_then(|g| {
                Some(Guid {
                    value: clean_url(&g.text())?,
                    is_permalink: !g
                        .attr("isPermaLink")
                        .is_some_and(|p| p.trim().eq_ignore_ascii_case("false")),
                })
            }),
            pub_date: date_of(el, &RSS, "pubDate"),
            content: el
                .child(&CONTENT, "encoded")
                .and_then(|c| clean_text(&c.text())),
            dublin_core: DublinCore::from_element(el),
            media_contents: media_contents(el),
            media_thumbnails: media_thumbnails(el),
        }
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.pub_date
            .as_ref()
            .and_then(Timestamp::value)
            .or_else(|| self.dublin_core.date.as_ref().and_then(Timestamp::value))
    }
}

impl Metadata for Channel {
    fn title(&self) -> String {
        self.dublin_core
            .title
            .clone()
            .unwrap_or_else(|| self.title.clone())
    }

    fn description(&self) -> String {
        self.dublin_core
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone())
    }

    fn link(&self) -> String {
        self.link.clone()
    }

    fn published(&self) -> DateTime<Utc> {
        self.pub_date
            .as_ref()
            .and_then(Timestamp::value)
            .or_else(|| self.dublin_core.date.as_ref().and_then(Timestamp::value))
            .unwrap_or(EPOCH)
    }

    fn updated(&self) -> DateTime<Utc> {
        self.last_build_date
            .as_ref()
            .and_then(Timestamp::value)
            .unwrap_or_else(|| self.published())
    }

    fn authors(&self) -> Vec<String> {
        if !self.dublin_core.creators.is_empty() {
            return self.dublin_core.creators.clone();
        }
        self.managing_editor.iter().cloned().collect()
    }

    fn contributors(&self) -> Vec<String> {
        self.dublin_core.contributors.clone()
    }

    fn rights(&self) -> String {
        self.dublin_core
            .rights
            .clone()
            .or_else(|| self.copyright.clone())
            .unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    fn language(&self) -> String {
        self.dublin_core
            .language
            .clone()
            .or_else(|| self.language.clone())
            .unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        if let Some(image) = &self.image {
            let mut found = Image::new(&image.url);
            found.title = image.title.clone();
            return Some(found);
        }
        self.media_thumbnails
            .first()
            .map(|url| Image::new(url).with_title(self.title()))
    }
}

impl FeedMetadata for Channel {
    type Entry = Item;

    fn source_url(&self) -> String {
        self.self_link.clone().unwrap_or_default()
    }

    fn set_source_url(&mut self, url: &str) {
        self.self_link = Some(url.to_owned());
    }

    fn set_image(&mut self, image: Image) {
        self.image = Some(ChannelImage {
            url: image.url,
            title: image.title,
            link: (!self.link.is_empty()).then(|| self.link.clone()),
        });
    }

    fn entries(&self) -> &[Item] {
        &self.items
    }

    fn update_interval(&self) -> Option<Duration> {
        self.ttl_interval()
            .or_else(|| self.syndication.interval())
            .or_else(|| estimate_interval(self.items.iter().map(Metadata::published)))
    }
}

impl Metadata for Item {
    fn title(&self) -> String {
        self.dublin_core
            .title
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_default()
    }

    fn description(&self) -> String {
        self.dublin_core
            .description
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_default()
    }

    /// Falls back to a permalink guid.
    fn link(&self) -> String {
        if let Some(link) = &self.link {
            return link.clone();
        }
        self.guid
            .as_ref()
            .filter(|g| g.is_permalink && g.value.starts_with("http"))
            .map(|g| g.value.clone())
            .unwrap_or_default()
    }

    fn published(&self) -> DateTime<Utc> {
        self.published_at().unwrap_or(EPOCH)
    }

    /// RSS items carry a single date.
    fn updated(&self) -> DateTime<Utc> {
        self.published()
    }

    fn authors(&self) -> Vec<String> {
        let mut authors = self.dublin_core.creators.clone();
        if let Some(author) = &self.author {
            if !authors.contains(author) {
                authors.push(author.clone());
            }
        }
        authors
    }

    fn contributors(&self) -> Vec<String> {
        self.dublin_core.contributors.clone()
    }

    fn rights(&self) -> String {
        self.dublin_core.rights.clone().unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    fn language(&self) -> String {
        self.dublin_core.language.clone().unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        let title = self.title();
        self.enclosure
            .as_ref()
            .filter(|e| is_image_type(e.mime_type.as_deref()))
            .map(|e| e.url.clone())
            .or_else(|| {
                self.media_contents
                    .iter()
                    .find(|m| m.is_image())
                    .map(|m| m.url.clone())
            })
            .or_else(|| self.media_thumbnails.first().cloned())
            .map(|url| Image::new(url).with_title(title))
    }
}

impl ItemMetadata for Item {
    fn id(&self) -> String {
        stable_id(
            self.guid.as_ref().map(|g| g.value.as_str()),
            &self.link(),
            &self.title(),
            self.published_at(),
        )
    }

    fn content(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

impl Validate for Channel {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        v.required("Channel.Title", &self.title);
        if v.required("Channel.Link", &self.link) {
            v.url("Channel.Link", &self.link);
        }
        v.required("Channel.Description", &self.description);
        v.datetime("Channel.PubDate", self.pub_date.as_ref());
        v.datetime("Channel.LastBuildDate", self.last_build_date.as_ref());
        if let Some(ttl) = &self.ttl {
            if ttl.parse::<u64>().is_err() {
                v.fail("Channel.TTL", rule::NUMERIC);
            }
        }
        self.syndication.check(&mut v, "Channel");
        for item in &self.items {
            v.merge(item.validate());
        }
        v.finish()
    }
}

impl Validate for Item {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        if self.title.is_none() && self.description.is_none() {
            v.fail("Item.Title", rule::REQUIRED_WITHOUT);
        }
        v.datetime("Item.PubDate", self.pub_date.as_ref());
        v.finish()
    }
}
