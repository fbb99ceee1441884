//! Concurrent fetch, classify and decode pipeline.
//!
//! [`Fetcher::fetch_one`] is the per-URL unit; the batch operations fan it out
//! over a bounded number of in-flight requests and never fail as a whole.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

use crate::classify::{classify, ClassifyError, Format};
use crate::config::Config;
use crate::decode::{decode, DecodeError, Decoded};
use crate::discovery::{discover_feed_url, discover_image, DiscoveryError, DEFAULT_IMAGE_TIMEOUT};
use crate::model::{Feed, Image, Item, Metadata};
use crate::util::{validate_url, UrlValidationError};
use crate::validate::ValidationErrors;

/// Feed types first, generic XML next, HTML last so servers with content
/// negotiation prefer the feed.
pub const ACCEPT_HEADER: &str = "application/rss+xml, application/rdf+xml, \
    application/atom+xml, application/feed+json, application/json;q=0.9, \
    application/xml;q=0.8, text/xml;q=0.8, text/html;q=0.7, \
    application/xhtml+xml;q=0.7, */*;q=0.1";

const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while fetching a single URL.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL failed validation (bad scheme, private address, etc.)
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request outlived the caller's deadline or the configured timeout
    #[error("Request timed out")]
    Timeout,
    #[error("Request cancelled")]
    Cancelled,
    /// Response body exceeded `max_response_bytes`
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Unrecognized response: {0}")]
    Classify(#[from] ClassifyError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Decoded, but failed validation while `strict_validation` is on
    #[error("Feed failed validation: {0}")]
    Invalid(ValidationErrors),
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    /// A discovered URL pointed back at a page already visited
    #[error("Discovery loop at {0}")]
    DiscoveryLoop(String),
    #[error("Discovery depth {depth} exceeded")]
    DiscoveryDepthExceeded { depth: usize },
}

impl FetchError {
    /// Whether an HTML page simply had no feed or image reference.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Discovery(DiscoveryError::NotFound))
    }
}

fn network_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Deadline and cancellation signal shared by every request of a call.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every fetch whose context was built from the paired receiver.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context and the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self::new().with_cancel(rx), CancelHandle(tx))
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Time left before the deadline, or `default` when there is none.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(default)
    }

    /// Resolves once cancelled. Never resolves without a cancel signal or
    /// after the handle is dropped uncancelled.
    async fn cancelled(&self) {
        if let Some(rx) = &self.cancel {
            let mut rx = rx.clone();
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome for one requested URL.
#[derive(Debug)]
pub struct FeedResult {
    /// The URL as the caller passed it.
    pub url: String,
    pub result: Result<Feed, FetchError>,
    /// Validation failures of a feed kept in lenient mode.
    pub warnings: Option<ValidationErrors>,
}

impl FeedResult {
    pub fn feed(&self) -> Option<&Feed> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }
}

#[derive(Debug)]
pub struct FeedItemsResult {
    pub url: String,
    pub result: Result<Vec<Item>, FetchError>,
}

impl FeedItemsResult {
    pub fn items(&self) -> Option<&[Item]> {
        self.result.as_deref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }
}

impl From<FeedResult> for FeedItemsResult {
    fn from(result: FeedResult) -> Self {
        Self {
            url: result.url,
            result: result.result.map(|feed| feed.items()),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Builds the shared HTTP client from `config`.
///
/// Redirects are limited to five hops, loops are refused and, when
/// `block_private_addresses` is on, so is any hop to a private address.
pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));

    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .redirect(redirect_policy(config.block_private_addresses))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(config.request_timeout())
        .build()
}

fn redirect_policy(block_private: bool) -> Policy {
    Policy::custom(move |attempt| {
        // `previous` includes the original request URL.
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        // SEC: a public URL may redirect to an internal one
        if let Err(e) = validate_url(url.as_str(), block_private) {
            return attempt.error(e);
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

// ============================================================================
// Fetcher
// ============================================================================

/// A fetched response body and what is needed to interpret it.
struct Fetched {
    /// Where the body actually came from, after redirects.
    url: Url,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Fetches, classifies and decodes feeds. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, config: Config) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// A fetcher with a client built by [`build_client`].
    pub fn from_config(config: Config) -> Result<Self, FetchError> {
        let client = build_client(&config)?;
        Ok(Self::new(client, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetches one URL, following feed references out of HTML pages.
    ///
    /// The returned feed's source URL is the URL the feed document was
    /// actually served from, whatever the document claims.
    pub async fn fetch_one(&self, ctx: &FetchContext, url: &str) -> FeedResult {
        let (result, warnings) = match self.resolve(ctx, url).await {
            Ok(decoded) => self.apply_validation(url, decoded),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Feed fetch failed");
                (Err(e), None)
            }
        };

        FeedResult {
            url: url.to_owned(),
            result,
            warnings,
        }
    }

    /// Fetches every URL with at most `max_concurrent_fetches` in flight.
    ///
    /// One result per URL, in completion order. A failing URL never affects
    /// the others.
    pub async fn fetch_many<I, S>(&self, ctx: &FetchContext, urls: I) -> Vec<FeedResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let limit = self.config.max_concurrent_fetches.max(1);
        let urls: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_owned()).collect();
        let total = urls.len();

        let results: Vec<FeedResult> = stream::iter(urls)
            .map(|url| async move { self.fetch_one(ctx, &url).await })
            .buffer_unordered(limit)
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.result.is_err()).count();
        tracing::debug!(total = total, failed = failed, "Batch fetch complete");
        results
    }

    /// Like [`Fetcher::fetch_many`], yielding each feed's items.
    pub async fn fetch_items_many<I, S>(&self, ctx: &FetchContext, urls: I) -> Vec<FeedItemsResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fetch_many(ctx, urls)
            .await
            .into_iter()
            .map(FeedItemsResult::from)
            .collect()
    }

    /// Looks for an image on the feed's home page and stores it on the feed.
    ///
    /// # Errors
    ///
    /// [`FetchError::InvalidUrl`] when the feed has no usable link,
    /// [`FetchError::Discovery`] when the page could not be read or offers no
    /// image (see [`FetchError::is_not_found`]).
    pub async fn find_feed_image(
        &self,
        ctx: &FetchContext,
        feed: &mut Feed,
    ) -> Result<Image, FetchError> {
        let page = validate_url(&feed.link(), self.config.block_private_addresses)?;
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let timeout = ctx.timeout(DEFAULT_IMAGE_TIMEOUT);
        let image = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(FetchError::Cancelled),
            result = discover_image(&self.client, &page, timeout) => result?,
        };

        feed.set_image(image.clone());
        Ok(image)
    }

    /// Fetch → classify → (discover → fetch)* → decode.
    async fn resolve(&self, ctx: &FetchContext, url: &str) -> Result<Decoded, FetchError> {
        let block_private = self.config.block_private_addresses;
        let mut target = validate_url(url, block_private)?;
        let mut visited: HashSet<Url> = HashSet::new();
        let mut depth = 0;

        loop {
            if !visited.insert(target.clone()) {
                return Err(FetchError::DiscoveryLoop(target.to_string()));
            }

            let fetched = self.get(ctx, &target).await?;
            if fetched.url != target {
                visited.insert(fetched.url.clone());
            }

            let format = classify(fetched.content_type.as_deref(), &fetched.body)?;
            if format != Format::Html {
                let mut decoded = decode(format, &fetched.body)?;
                let served_from = fetched.url.as_str();
                if decoded.feed.source_url() != served_from {
                    tracing::debug!(
                        claimed = %decoded.feed.source_url(),
                        served_from = %served_from,
                        "Overwriting feed source URL"
                    );
                    decoded.feed.set_source_url(served_from);
                }
                return Ok(decoded);
            }

            if depth >= self.config.max_discovery_depth {
                return Err(FetchError::DiscoveryDepthExceeded { depth });
            }

            let discovered = discover_feed_url(&fetched.url, &fetched.body)?;
            target = validate_url(discovered.as_str(), block_private)?;
            depth += 1;
            tracing::debug!(
                page = %fetched.url,
                feed = %target,
                depth = depth,
                "Following discovered feed URL"
            );
        }
    }

    fn apply_validation(
        &self,
        url: &str,
        decoded: Decoded,
    ) -> (Result<Feed, FetchError>, Option<ValidationErrors>) {
        match decoded.into_parts() {
            (feed, None) => (Ok(feed), None),
            (_, Some(errors)) if self.config.strict_validation => {
                (Err(FetchError::Invalid(errors)), None)
            }
            (feed, Some(errors)) => {
                tracing::warn!(
                    url = %url,
                    failures = errors.len(),
                    errors = %errors,
                    "Feed failed validation, keeping it"
                );
                (Ok(feed), Some(errors))
            }
        }
    }

    /// One GET bounded by the context's deadline and cancel signal.
    async fn get(&self, ctx: &FetchContext, url: &Url) -> Result<Fetched, FetchError> {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let timeout = ctx.timeout(self.config.request_timeout());
        let request = async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(network_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = read_limited_bytes(response, self.config.max_response_bytes).await?;

            Ok(Fetched {
                url: final_url,
                content_type,
                body,
            })
        };

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, request) => {
                result.map_err(|_| FetchError::Timeout)?
            }
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
