//! Feed normalization and discovery.
//!
//! `feedsift` turns RSS 2.0/1.0, Atom and JSON Feed documents into a single
//! [`Feed`] model, and finds the feed behind an HTML page when handed one.
//!
//! - [`classify`] decides what a response body is from its `Content-Type`
//! - [`decode`] turns bytes into a validated [`Feed`]
//! - [`discovery`] scans HTML for a feed reference or a representative image
//! - [`fetcher`] runs the whole pipeline concurrently over a batch of URLs
//!
//! ```no_run
//! use feedsift::{Config, FetchContext, Fetcher, Metadata};
//!
//! # async fn run() -> Result<(), feedsift::FetchError> {
//! let fetcher = Fetcher::from_config(Config::default())?;
//! let results = fetcher
//!     .fetch_many(&FetchContext::new(), ["https://example.com/blog/"])
//!     .await;
//! for result in &results {
//!     match &result.result {
//!         Ok(feed) => println!("{}: {}", result.url, feed.title()),
//!         Err(e) => eprintln!("{}: {e}", result.url),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod decode;
pub mod discovery;
pub mod fetcher;
pub mod format;
pub mod model;
mod page;
pub mod sanitize;
pub mod util;
pub mod validate;

pub use classify::{classify, ClassifyError, Format};
pub use config::{Config, ConfigError};
pub use decode::{decode, DecodeError, Decoded};
pub use discovery::{discover_feed_url, discover_image, DiscoveryError};
pub use fetcher::{
    build_client, CancelHandle, FeedItemsResult, FeedResult, FetchContext, FetchError, Fetcher,
};
pub use model::{Feed, FeedMetadata, Image, Item, ItemMetadata, Metadata, SourceType};
pub use validate::{Validate, ValidationErrors};
