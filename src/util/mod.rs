//! Small helpers shared by the decoder and the fetch pipeline.
//!
//! - **URL validation**: SSRF guard applied before every outbound request
//! - **Text cleanup**: control-character stripping applied before sanitization

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_url, UrlValidationError};
