use std::cell::RefCell;
use std::time::Duration;

use futures::StreamExt;
use lol_html::html_content::Element;
use lol_html::{element, HtmlRewriter, Settings};
use thiserror::Error;
use url::Url;

use crate::classify::{is_feed_media_type, media_type};
use crate::model::Image;
use crate::page;

/// Default budget for fetching a page when the caller has no deadline.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Path suffixes that mark a `<link>` href as a feed.
const LINK_FEED_SUFFIXES: &[&str] = &["feed", "rss", "atom"];
/// Path suffixes that mark an `<a>` href as a feed.
const ANCHOR_FEED_SUFFIXES: &[&str] = &["feed"];

/// Errors that can occur while looking inside an HTML page.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The page has no qualifying reference. Not a fault: most pages have none.
    #[error("no feed or image reference found")]
    NotFound,
    /// The HTML scanner gave up before finding anything
    #[error("failed to scan HTML: {0}")]
    Parse(String),
    /// The page URL failed validation (SSRF, bad scheme, etc.)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// HTTP request failed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    /// Response body exceeded the 5MB size limit
    #[error("response too large")]
    TooLarge,
}

/// Finds the first feed reference in an HTML page.
///
/// A `<link>` qualifies when its `rel` contains `alternate` and its `type` is
/// a feed media type, or when its href path ends in `feed`, `rss` or `atom`.
/// An `<a>` qualifies when its href path ends in `feed`. Scanning stops at the
/// first qualifying element in document order.
///
/// # Errors
///
/// [`DiscoveryError::NotFound`] when nothing qualifies,
/// [`DiscoveryError::Parse`] when the scanner failed first.
///
/// # Examples
///
/// ```
/// use feedsift::discovery::discover_feed_url;
/// use url::Url;
///
/// let page = Url::parse("https://example.com/blog/").unwrap();
/// let html = br#"<head><link rel="alternate" type="application/rss+xml" href="/rss.xml"></head>"#;
/// let found = discover_feed_url(&page, html).unwrap();
/// assert_eq!(found.as_str(), "https://example.com/rss.xml");
/// ```
pub fn discover_feed_url(page_url: &Url, html: &[u8]) -> Result<Url, DiscoveryError> {
    let found: RefCell<Option<Url>> = RefCell::new(None);

    let scanned = {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("link[href]", |el| {
                        match qualifying_href(el, page_url, true) {
                            Some(url) => stop_at(&found, url),
                            None => Ok(()),
                        }
                    }),
                    element!("a[href]", |el| {
                        match qualifying_href(el, page_url, false) {
                            Some(url) => stop_at(&found, url),
                            None => Ok(()),
                        }
                    }),
                ],
                ..Default::default()
            },
            |_: &[u8]| {},
        );
        rewriter.write(html).and_then(|()| rewriter.end())
    };

    if let Some(url) = found.into_inner() {
        tracing::debug!(page = %page_url, feed = %url, "Found feed reference in page");
        return Ok(url);
    }
    match scanned {
        Ok(()) => Err(DiscoveryError::NotFound),
        Err(e) => Err(DiscoveryError::Parse(e.to_string())),
    }
}

/// Records the first match and aborts the scan.
fn stop_at(
    found: &RefCell<Option<Url>>,
    url: Url,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut slot = found.borrow_mut();
    if slot.is_none() {
        *slot = Some(url);
    }
    Err("feed reference found".into())
}

fn qualifying_href(el: &Element<'_, '_>, page_url: &Url, is_link: bool) -> Option<Url> {
    let href = el.get_attribute("href")?;
    let resolved = resolve_url(&href, page_url)?;

    if is_link {
        let rel = el.get_attribute("rel").unwrap_or_default();
        let is_alternate = rel
            .split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("alternate"));
        let is_feed_typed = el
            .get_attribute("type")
            .is_some_and(|t| is_feed_media_type(&media_type(&t)));
        if (is_alternate && is_feed_typed) || path_ends_with(&resolved, LINK_FEED_SUFFIXES) {
            return Some(resolved);
        }
        return None;
    }

    path_ends_with(&resolved, ANCHOR_FEED_SUFFIXES).then_some(resolved)
}

/// Whether the URL path ends in one of `suffixes`, ignoring a trailing slash.
fn path_ends_with(url: &Url, suffixes: &[&str]) -> bool {
    let path = url.path();
    let path = path.strip_suffix('/').unwrap_or(path);
    suffixes.iter().any(|suffix| path.ends_with(suffix))
}

/// Resolves a potentially relative href against the page URL.
fn resolve_url(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Fetches a page and picks a representative image: the hero image when the
/// page declares one, its favicon otherwise.
///
/// The caller is responsible for validating `page_url`.
///
/// # Errors
///
/// Returns [`DiscoveryError`] on network error, timeout, oversized response,
/// or when the page has neither image.
pub async fn discover_image(
    client: &reqwest::Client,
    page_url: &Url,
    timeout: Duration,
) -> Result<Image, DiscoveryError> {
    let html = tokio::time::timeout(timeout, fetch_page(client, page_url))
        .await
        .map_err(|_| DiscoveryError::Timeout)??;

    let images = page::extract_images(&html, page_url);
    let title = images.title.clone();
    let url = images
        .hero
        .or(images.favicon)
        .ok_or(DiscoveryError::NotFound)?;

    tracing::debug!(page = %page_url, image = %url, "Discovered page image");
    let image = Image::new(url.as_str());
    Ok(match title {
        Some(title) => image.with_title(title),
        None => image,
    })
}

async fn fetch_page(client: &reqwest::Client, page_url: &Url) -> Result<String, DiscoveryError> {
    let response = client.get(page_url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(DiscoveryError::HttpStatus(response.status().as_u16()));
    }
    let bytes = read_page_bytes(response).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads response body with a 5MB size limit using stream-based reading.
async fn read_page_bytes(response: reqwest::Response) -> Result<Vec<u8>, DiscoveryError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if usize::try_from(len).unwrap_or(usize::MAX) > MAX_PAGE_SIZE {
            return Err(DiscoveryError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(DiscoveryError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > MAX_PAGE_SIZE {
            return Err(DiscoveryError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page() -> Url {
        Url::parse("https://example.com/blog/").unwrap()
    }

    fn discover(html: &str) -> Result<Url, DiscoveryError> {
        discover_feed_url(&page(), html.as_bytes())
    }

    // --- Feed URL discovery (no network) ---

    #[test]
    fn test_alternate_rss_link() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="https://example.com/feed.xml">
        </head></html>"#;
        assert_eq!(discover(html).unwrap().as_str(), "https://example.com/feed.xml");
    }

    #[test]
    fn test_alternate_atom_link_self_closing() {
        let html = r#"<link rel="alternate" type="application/atom+xml" href="/atom.xml" />"#;
        assert_eq!(discover(html).unwrap().as_str(), "https://example.com/atom.xml");
    }

    #[test]
    fn test_relative_href_resolved_against_page() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="index.xml">"#;
        assert_eq!(
            discover(html).unwrap().as_str(),
            "https://example.com/blog/index.xml"
        );
    }

    #[test]
    fn test_rel_token_list_and_type_parameters() {
        let html = r#"<link rel="Alternate home" type="application/rss+xml; charset=utf-8" href="/x.xml">"#;
        assert_eq!(discover(html).unwrap().as_str(), "https://example.com/x.xml");
    }

    #[test]
    fn test_first_match_wins() {
        let html = r#"<head>
            <link rel="alternate" type="application/atom+xml" href="/first.atom">
            <link rel="alternate" type="application/rss+xml" href="/second.rss">
        </head>"#;
        assert_eq!(discover(html).unwrap().as_str(), "https://example.com/first.atom");
    }

    #[test]
    fn test_link_path_suffix() {
        let html = r#"<link rel="stylesheet" href="/style.css"><link href="/comments/feed/">"#;
        assert_eq!(
            discover(html).unwrap().as_str(),
            "https://example.com/comments/feed/"
        );
    }

    #[test]
    fn test_anchor_feed_path() {
        let html = r#"<body><a href="/about">About</a><a href="/feed">Subscribe</a></body>"#;
        assert_eq!(discover(html).unwrap().as_str(), "https://example.com/feed");
    }

    #[test]
    fn test_anchor_rss_path_does_not_qualify() {
        let html = r#"<body><a href="/rss">RSS</a></body>"#;
        assert!(matches!(discover(html), Err(DiscoveryError::NotFound)));
    }

    #[test]
    fn test_alternate_without_feed_type_ignored() {
        let html = r#"<link rel="alternate" hreflang="de" href="/de/">"#;
        assert!(matches!(discover(html), Err(DiscoveryError::NotFound)));
    }

    #[test]
    fn test_no_feed_links() {
        let html = r#"<html><head><title>No feeds</title></head><body>Hello</body></html>"#;
        assert!(matches!(discover(html), Err(DiscoveryError::NotFound)));
    }

    #[test]
    fn test_non_http_href_ignored() {
        let html = r#"<a href="javascript:feed">x</a><a href="mailto:feed">y</a>"#;
        assert!(matches!(discover(html), Err(DiscoveryError::NotFound)));
    }

    // --- Image discovery (mock HTTP) ---

    #[tokio::test]
    async fn test_discover_image_og_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Post</title>
                <meta property="og:image" content="/img/hero.jpg">
                <link rel="icon" href="/favicon.png">
                </head></html>"#,
            ))
            .mount(&server)
            .await;

        let page_url = Url::parse(&format!("{}/post", server.uri())).unwrap();
        let image = discover_image(&reqwest::Client::new(), &page_url, DEFAULT_IMAGE_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(image.url, format!("{}/img/hero.jpg", server.uri()));
        assert_eq!(image.title.as_deref(), Some("Post"));
    }

    #[tokio::test]
    async fn test_discover_image_falls_back_to_favicon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><link rel="shortcut icon" href="/favicon.ico"></head></html>"#,
            ))
            .mount(&server)
            .await;

        let page_url = Url::parse(&server.uri()).unwrap();
        let image = discover_image(&reqwest::Client::new(), &page_url, DEFAULT_IMAGE_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(image.url, format!("{}/favicon.ico", server.uri()));
    }

    #[tokio::test]
    async fn test_discover_image_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>plain</p>"))
            .mount(&server)
            .await;

        let page_url = Url::parse(&server.uri()).unwrap();
        let result =
            discover_image(&reqwest::Client::new(), &page_url, DEFAULT_IMAGE_TIMEOUT).await;
        assert!(matches!(result, Err(DiscoveryError::NotFound)));
    }

    #[tokio::test]
    async fn test_discover_image_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let page_url = Url::parse(&server.uri()).unwrap();
        let result =
            discover_image(&reqwest::Client::new(), &page_url, DEFAULT_IMAGE_TIMEOUT).await;
        assert!(matches!(result, Err(DiscoveryError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_discover_image_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>slow</p>")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let page_url = Url::parse(&server.uri()).unwrap();
        let result = discover_image(
            &reqwest::Client::new(),
            &page_url,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(DiscoveryError::Timeout)));
    }

    #[tokio::test]
    async fn test_discover_image_page_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("a".repeat(MAX_PAGE_SIZE + 1), "text/html"),
            )
            .mount(&server)
            .await;

        let page_url = Url::parse(&server.uri()).unwrap();
        let result =
            discover_image(&reqwest::Client::new(), &page_url, DEFAULT_IMAGE_TIMEOUT).await;
        assert!(matches!(result, Err(DiscoveryError::TooLarge)));
    }
}
