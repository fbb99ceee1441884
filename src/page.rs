//! Image extraction from an HTML page.

use scraper::{Html, Selector};
use url::Url;

/// Hero image candidates, most specific first, as (selector, attribute).
const HERO_SELECTORS: &[(&str, &str)] = &[
    (r#"meta[property="og:image"]"#, "content"),
    (r#"meta[property="og:image:url"]"#, "content"),
    (r#"meta[property="og:image:secure_url"]"#, "content"),
    (r#"meta[name="twitter:image"]"#, "content"),
    (r#"meta[name="twitter:image:src"]"#, "content"),
    (r#"link[rel="image_src"]"#, "href"),
    ("article img[src]", "src"),
    ("main img[src]", "src"),
];

const FAVICON_SELECTORS: &[(&str, &str)] = &[
    (r#"link[rel~="icon"]"#, "href"),
    (r#"link[rel="apple-touch-icon"]"#, "href"),
];

/// Images a page offers, resolved against the page URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PageImages {
    pub hero: Option<Url>,
    pub favicon: Option<Url>,
    pub title: Option<String>,
}

pub(crate) fn extract_images(html: &str, base: &Url) -> PageImages {
    let doc = Html::parse_document(html);
    PageImages {
        hero: first_url(&doc, HERO_SELECTORS, base),
        favicon: first_url(&doc, FAVICON_SELECTORS, base),
        title: title(&doc),
    }
}

fn first_url(doc: &Html, candidates: &[(&str, &str)], base: &Url) -> Option<Url> {
    candidates.iter().find_map(|(selector, attr)| {
        let selector = Selector::parse(selector).ok()?;
        doc.select(&selector)
            .filter_map(|el| el.value().attr(attr))
            .find_map(|value| resolve(value, base))
    })
}

fn resolve(value: &str, base: &Url) -> Option<Url> {
    let value = value.trim();
    if value.is_empty() || value.starts_with("data:") {
        return None;
    }
    let url = base.join(value).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .filter(|t| !t.is_empty())
}
