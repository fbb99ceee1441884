//! Atom 1.0 documents (RFC 4287).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ext::{media_thumbnails, DublinCore, Syndication};
use super::xml::{self, Element};
use super::{clean_text, clean_url, date_of, stable_id, url_of, ATOM, XML};
use crate::decode::DecodeError;
use crate::model::{
    estimate_interval, format_person, FeedMetadata, Image, ItemMetadata, Metadata, Timestamp,
    EPOCH,
};
use crate::validate::{rule, Validate, ValidationErrors, Validator};

const ATOM_MIME: &str = "application/atom+xml";

/// A text construct (`title`, `subtitle`, `summary`, `rights`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    /// `text`, `html` or `xhtml`.
    #[serde(default = "default_text_kind")]
    pub kind: String,
    pub value: String,
}

fn default_text_kind() -> String {
    "text".to_owned()
}

/// A person construct (`author`, `contributor`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_person(&self.name, self.email.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    /// A missing `rel` means `alternate`.
    fn is_alternate(&self) -> bool {
        self.rel.as_deref().map_or(true, |r| r == "alternate")
    }

    fn is_self(&self) -> bool {
        self.rel.as_deref() == Some("self")
    }

    fn is_atom_typed(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(ATOM_MIME))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Element text, which some generators use instead of `term`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Category {
    fn display(&self) -> Option<String> {
        self.label
            .clone()
            .or_else(|| self.value.clone())
            .or_else(|| (!self.term.is_empty()).then(|| self.term.clone()))
    }
}

/// Entry content: inline (`value`) or out of line (`src`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default = "default_text_kind")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

/// An Atom `<feed>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Person>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<Person>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// `xml:lang` on the root element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default)]
    pub dublin_core: DublinCore,
    #[serde(default)]
    pub syndication: Syndication,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_thumbnails: Vec<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// An Atom `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Text,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Person>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<Person>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<Text>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default)]
    pub dublin_core: DublinCore,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_thumbnails: Vec<String>,
}

impl Feed {
    pub fn from_xml(bytes: &[u8]) -> Result<Self, DecodeError> {
        let root = xml::parse(bytes)?;
        if !root.is(&ATOM, "feed") {
            return Err(DecodeError::UnexpectedRoot {
                expected: "feed",
                found: root.name,
            });
        }
        Ok(Feed::from_element(&root))
    }

    fn from_element(el: &Element) -> Self {
        Self {
            id: url_of(el, &ATOM, "id").unwrap_or_default(),
            title: text_construct(el, "title").unwrap_or_default(),
            subtitle: text_construct(el, "subtitle"),
            updated: date_of(el, &ATOM, "updated"),
            links: links(el),
            authors: persons(el, "author"),
            contributors: persons(el, "contributor"),
            categories: categories(el),
            rights: text_construct(el, "rights"),
            icon: url_of(el, &ATOM, "icon"),
            logo: url_of(el, &ATOM, "logo"),
            generator: el
                .child(&ATOM, "generator")
                .and_then(|g| clean_text(&g.text())),
            lang: el.attr_ns(&XML, "lang").and_then(clean_text),
            dublin_core: DublinCore::from_element(el),
            syndication: Syndication::from_element(el),
            media_thumbnails: media_thumbnails(el),
            entries: el.children(&ATOM, "entry").map(Entry::from_element).collect(),
        }
    }

    /// Every feed-level author string, persons first.
    fn author_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.authors.iter().map(Person::to_string).collect();
        names.extend(self.dublin_core.creators.iter().cloned());
        names
    }
}

impl Entry {
    fn from_element(el: &Element) -> Self {
        Self {
            id: url_of(el, &ATOM, "id").unwrap_or_default(),
            title: text_construct(el, "title").unwrap_or_default(),
            summary: text_construct(el, "summary"),
            content: el.child(&ATOM, "content").map(|c| {
                let kind = c.attr("type").unwrap_or("text").trim().to_owned();
                Content {
                    value: construct_value(c, &kind),
                    src: c.attr("src").and_then(clean_url),
                    kind,
                }
            }),
            links: links(el),
            authors: persons(el, "author"),
            contributors: persons(el, "contributor"),
            categories: categories(el),
            published: date_of(el, &ATOM, "published"),
            updated: date_of(el, &ATOM, "updated"),
            rights: text_construct(el, "rights"),
            lang: el.attr_ns(&XML, "lang").and_then(clean_text),
            dublin_core: DublinCore::from_element(el),
            media_thumbnails: media_thumbnails(el),
        }
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published
            .as_ref()
            .and_then(Timestamp::value)
            .or_else(|| self.dublin_core.date.as_ref().and_then(Timestamp::value))
    }

    fn check_fields(&self, v: &mut Validator) {
        if v.required("Entry.ID.Value", &self.id) {
            v.uri("Entry.ID.Value", &self.id);
        }
        v.required("Entry.Title", &self.title.value);
        v.required_datetime("Entry.Updated", self.updated.as_ref());
        v.datetime("Entry.Published", self.published.as_ref());
        for person in self.authors.iter().chain(&self.contributors) {
            check_person(person, v);
        }
    }
}

fn text_construct(el: &Element, local: &str) -> Option<Text> {
    let child = el.child(&ATOM, local)?;
    let kind = child.attr("type").unwrap_or("text").trim().to_owned();
    let value = construct_value(child, &kind);
    Some(Text { kind, value })
}

/// Sanitized body of a text construct. XHTML bodies are wrapped in a
/// `<div>` that is not part of the content.
fn construct_value(el: &Element, kind: &str) -> String {
    let raw = if kind == "xhtml" {
        match el.elements().next() {
            Some(div) if div.name == "div" => div.inner_xml(),
            _ => el.inner_xml(),
        }
    } else {
        el.text()
    };
    clean_text(&raw).unwrap_or_default()
}

fn links(el: &Element) -> Vec<Link> {
    el.children(&ATOM, "link")
        .filter_map(|l| {
            Some(Link {
                href: clean_url(l.attr("href")?)?,
                rel: l.attr("rel").map(|r| r.trim().to_owned()),
                mime_type: l.attr("type").map(|t| t.trim().to_owned()),
                title: l.attr("title").and_then(clean_text),
            })
        })
        .collect()
}

fn persons(el: &Element, local: &str) -> Vec<Person> {
    el.children(&ATOM, local)
        .map(|p| Person {
            name: p
                .child(&ATOM, "name")
                .and_then(|n| clean_text(&n.text()))
                .unwrap_or_default(),
            email: url_of(p, &ATOM, "email"),
            uri: url_of(p, &ATOM, "uri"),
        })
        .collect()
}

fn categories(el: &Element) -> Vec<Category> {
    el.children(&ATOM, "category")
        .map(|c| Category {
            term: c.attr("term").and_then(clean_text).unwrap_or_default(),
            scheme: c.attr("scheme").and_then(clean_url),
            label: c.attr("label").and_then(clean_text),
            value: clean_text(&c.text()),
        })
        .collect()
}

fn check_person(person: &Person, v: &mut Validator) {
    v.required("PersonConstruct.Name.Value", &person.name);
    if let Some(email) = &person.email {
        v.email("PersonConstruct.Email.Value", email);
    }
    if let Some(uri) = &person.uri {
        v.uri("PersonConstruct.URI.Value", uri);
    }
}

fn category_names(categories: &[Category]) -> Vec<String> {
    categories.iter().filter_map(Category::display).collect()
}

fn person_names(persons: &[Person], extra: &[String]) -> Vec<String> {
    persons
        .iter()
        .map(Person::to_string)
        .chain(extra.iter().cloned())
        .collect()
}

impl Metadata for Feed {
    fn title(&self) -> String {
        self.dublin_core
            .title
            .clone()
            .unwrap_or_else(|| self.title.value.clone())
    }

    fn description(&self) -> String {
        self.dublin_core
            .description
            .clone()
            .or_else(|| self.subtitle.as_ref().map(|s| s.value.clone()))
            .unwrap_or_default()
    }

    /// A non-Atom `self` link (the page the feed describes) or the first
    /// alternate link.
    fn link(&self) -> String {
        self.links
            .iter()
            .find(|l| (l.is_self() && !l.is_atom_typed()) || l.is_alternate())
            .map(|l| l.href.clone())
            .unwrap_or_default()
    }

    /// Atom feeds only carry `updated`.
    fn published(&self) -> DateTime<Utc> {
        self.updated()
    }

    fn updated(&self) -> DateTime<Utc> {
        Timestamp::or_epoch(self.updated.as_ref())
    }

    fn authors(&self) -> Vec<String> {
        self.author_names()
    }

    fn contributors(&self) -> Vec<String> {
        person_names(&self.contributors, &self.dublin_core.contributors)
    }

    fn rights(&self) -> String {
        self.dublin_core
            .rights
            .clone()
            .or_else(|| self.rights.as_ref().map(|r| r.value.clone()))
            .unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        category_names(&self.categories)
    }

    fn language(&self) -> String {
        self.dublin_core
            .language
            .clone()
            .or_else(|| self.lang.clone())
            .unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        self.media_thumbnails
            .first()
            .or(self.logo.as_ref())
            .or(self.icon.as_ref())
            .map(|url| Image::new(url).with_title(self.title()))
    }
}

impl FeedMetadata for Feed {
    type Entry = Entry;

    fn source_url(&self) -> String {
        self.links
            .iter()
            .find(|l| l.is_self() && l.is_atom_typed())
            .map(|l| l.href.clone())
            .unwrap_or_default()
    }

    /// Replaces the href of the Atom-typed self link, adding one if needed.
    fn set_source_url(&mut self, url: &str) {
        match self
            .links
            .iter_mut()
            .find(|l| l.is_self() && l.is_atom_typed())
        {
            Some(link) => link.href = url.to_owned(),
            None => self.links.push(Link {
                href: url.to_owned(),
                rel: Some("self".to_owned()),
                mime_type: Some(ATOM_MIME.to_owned()),
                title: None,
            }),
        }
    }

    fn set_image(&mut self, image: Image) {
        self.media_thumbnails.insert(0, image.url);
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn update_interval(&self) -> Option<Duration> {
        self.syndication
            .interval()
            .or_else(|| estimate_interval(self.entries.iter().map(Metadata::published)))
    }
}

impl Metadata for Entry {
    fn title(&self) -> String {
        self.dublin_core
            .title
            .clone()
            .unwrap_or_else(|| self.title.value.clone())
    }

    fn description(&self) -> String {
        self.dublin_core
            .description
            .clone()
            .or_else(|| self.summary.as_ref().map(|s| s.value.clone()))
            .unwrap_or_default()
    }

    fn link(&self) -> String {
        self.links
            .iter()
            .find(|l| l.is_alternate())
            .map(|l| l.href.clone())
            .unwrap_or_default()
    }

    fn published(&self) -> DateTime<Utc> {
        self.published_at().unwrap_or(EPOCH)
    }

    fn updated(&self) -> DateTime<Utc> {
        Timestamp::or_epoch(self.updated.as_ref())
    }

    fn authors(&self) -> Vec<String> {
        person_names(&self.authors, &self.dublin_core.creators)
    }

    fn contributors(&self) -> Vec<String> {
        person_names(&self.contributors, &self.dublin_core.contributors)
    }

    fn rights(&self) -> String {
        self.dublin_core
            .rights
            .clone()
            .or_else(|| self.rights.as_ref().map(|r| r.value.clone()))
            .unwrap_or_default()
    }

    fn categories(&self) -> Vec<String> {
        category_names(&self.categories)
    }

    fn language(&self) -> String {
        self.dublin_core
            .language
            .clone()
            .or_else(|| self.lang.clone())
            .unwrap_or_default()
    }

    fn image(&self) -> Option<Image> {
        self.media_thumbnails
            .first()
            .map(|url| Image::new(url).with_title(self.title()))
    }
}

impl ItemMetadata for Entry {
    fn id(&self) -> String {
        stable_id(
            Some(self.id.as_str()),
            &self.link(),
            &self.title(),
            self.published_at(),
        )
    }

    fn content(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                if c.value.is_empty() {
                    c.src.clone().unwrap_or_default()
                } else {
                    c.value.clone()
                }
            })
            .unwrap_or_default()
    }
}

impl Validate for Feed {
    /// Field rules first; the feed-author rule only runs when they pass.
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        if v.required("Feed.ID.Value", &self.id) {
            v.uri("Feed.ID.Value", &self.id);
        }
        v.required("Feed.Title", &self.title.value);
        v.required_datetime("Feed.Updated", self.updated.as_ref());
        for person in self.authors.iter().chain(&self.contributors) {
            check_person(person, &mut v);
        }
        for entry in &self.entries {
            entry.check_fields(&mut v);
        }
        self.syndication.check(&mut v, "Feed");

        if v.is_clean()
            && self.author_names().is_empty()
            && self.entries.iter().any(|e| e.authors().is_empty())
        {
            v.fail("Feed.Authors", rule::ENTRY_AUTHORS);
        }
        v.finish()
    }
}

impl Validate for Entry {
    /// Standalone entries must name at least one author.
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = Validator::new();
        self.check_fields(&mut v);
        if self.authors().is_empty() {
            v.fail("Entry.Authors", rule::GT);
        }
        v.finish()
    }
}
