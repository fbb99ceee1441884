//! Extension vocabularies shared by RSS and Atom documents.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::xml::Element;
use super::{clean_url, date_of, is_image_type, text_of, texts_of, DC, MEDIA, SY};
use crate::model::Timestamp;
use crate::validate::{rule, Validator};

/// Dublin Core elements (`dc:*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DublinCore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Timestamp>,
}

impl DublinCore {
    pub(crate) fn from_element(el: &Element) -> Self {
        Self {
            title: text_of(el, &DC, "title"),
            description: text_of(el, &DC, "description"),
            creators: texts_of(el, &DC, "creator"),
            contributors: texts_of(el, &DC, "contributor"),
            rights: text_of(el, &DC, "rights"),
            language: text_of(el, &DC, "language"),
            date: date_of(el, &DC, "date"),
        }
    }
}

/// Syndication module hints (`sy:updatePeriod`, `sy:updateFrequency`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syndication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<String>,
}

impl Syndication {
    pub(crate) fn from_element(el: &Element) -> Self {
        let raw = |local: &str| el.child(&SY, local).map(|c| c.text().trim().to_owned());
        Self {
            update_period: raw("updatePeriod"),
            update_frequency: raw("updateFrequency"),
        }
    }

    /// Period divided by frequency. `None` when no period is given or either
    /// value is unusable.
    pub fn interval(&self) -> Option<Duration> {
        let period = period_length(self.update_period.as_deref()?)?;
        let frequency = match self.update_frequency.as_deref() {
            Some(raw) => raw.parse::<u32>().ok().filter(|f| *f > 0)?,
            None => 1,
        };
        Some(period / frequency)
    }

    pub(crate) fn check(&self, v: &mut Validator, scope: &str) {
        if let Some(period) = &self.update_period {
            if period_length(period).is_none() {
                v.fail(&format!("{scope}.UpdatePeriod"), rule::ONE_OF);
            }
        }
        if let Some(frequency) = &self.update_frequency {
            if !frequency.parse::<i64>().is_ok_and(|f| f > 0) {
                v.fail(&format!("{scope}.UpdateFrequency"), rule::GT);
            }
        }
    }
}

fn period_length(period: &str) -> Option<Duration> {
    const HOUR: u64 = 3600;
    let hours = match period.trim().to_ascii_lowercase().as_str() {
        "hourly" => 1,
        "daily" => 24,
        "weekly" => 24 * 7,
        "monthly" => 24 * 30,
        "yearly" => 24 * 365,
        _ => return None,
    };
    Some(Duration::from_secs(hours * HOUR))
}

/// A `media:content` reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaContent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl MediaContent {
    pub fn is_image(&self) -> bool {
        self.medium.as_deref() == Some("image") || is_image_type(self.mime_type.as_deref())
    }
}

/// `media:content` children, including those grouped in `media:group`.
pub(crate) fn media_contents(el: &Element) -> Vec<MediaContent> {
    media_elements(el, "content")
        .filter_map(|c| {
            Some(MediaContent {
                url: clean_url(c.attr("url")?)?,
                medium: c.attr("medium").map(str::to_owned),
                mime_type: c.attr("type").map(str::to_owned),
            })
        })
        .collect()
}

/// `media:thumbnail` URLs, including those grouped in `media:group`.
pub(crate) fn media_thumbnails(el: &Element) -> Vec<String> {
    media_elements(el, "thumbnail")
        .filter_map(|c| c.attr("url").and_then(clean_url))
        .collect()
}

fn media_elements<'a>(el: &'a Element, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    let direct = el.children(&MEDIA, local);
    let grouped = el
        .children(&MEDIA, "group")
        .flat_map(move |g| g.children(&MEDIA, local));
    direct.chain(grouped)
}
