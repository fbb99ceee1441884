//! Field-level validation of decoded feeds.
//!
//! Validation never throws a decoded feed away. Decoders run it and attach
//! the outcome to [`crate::decode::Decoded`]; callers decide whether a failure
//! is fatal.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Timestamp;

/// Stable rule names reported in [`FieldFailure::rule`].
pub mod rule {
    pub const REQUIRED: &str = "required";
    pub const REQUIRED_WITHOUT: &str = "required_without";
    pub const URL: &str = "url";
    pub const URI: &str = "uri";
    pub const EMAIL: &str = "email";
    pub const DATETIME: &str = "datetime";
    pub const ONE_OF: &str = "oneof";
    pub const GT: &str = "gt";
    pub const NUMERIC: &str = "numeric";
    pub const JSONFEED_VERSION: &str = "jsonfeed_version";
    pub const ENTRY_AUTHORS: &str = "entry_authors";
}

/// A single failed rule on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    /// Dotted path of the field, e.g. `Channel.Title` or `Entry.ID.Value`.
    pub path: String,
    /// Name of the rule that failed, one of the constants in [`rule`].
    pub rule: String,
}

impl fmt::Display for FieldFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed rule {}", self.path, self.rule)
    }
}

/// Every rule failure found in one feed. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", join_failures(.0))]
pub struct ValidationErrors(Vec<FieldFailure>);

fn join_failures(failures: &[FieldFailure]) -> String {
    failures
        .iter()
        .map(FieldFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn failures(&self) -> &[FieldFailure] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `path` failed `rule`.
    pub fn has(&self, path: &str, rule: &str) -> bool {
        self.0.iter().any(|f| f.path == path && f.rule == rule)
    }

    pub fn into_failures(self) -> Vec<FieldFailure> {
        self.0
    }
}

/// Implemented by every raw per-format feed and item type.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Accumulates failures for one validation run.
#[derive(Debug, Default)]
pub(crate) struct Validator {
    failures: Vec<FieldFailure>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail(&mut self, path: &str, rule: &str) {
        self.failures.push(FieldFailure {
            path: path.to_owned(),
            rule: rule.to_owned(),
        });
    }

    /// Fails `required` when the value is blank. Returns whether it was present.
    pub(crate) fn required(&mut self, path: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.fail(path, rule::REQUIRED);
            return false;
        }
        true
    }

    /// Absolute URL with a network scheme.
    pub(crate) fn url(&mut self, path: &str, value: &str) {
        let ok = url::Url::parse(value.trim())
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !ok {
            self.fail(path, rule::URL);
        }
    }

    /// Any absolute URI, including `urn:` and `tag:` forms.
    pub(crate) fn uri(&mut self, path: &str, value: &str) {
        if url::Url::parse(value.trim()).is_err() {
            self.fail(path, rule::URI);
        }
    }

    pub(crate) fn email(&mut self, path: &str, value: &str) {
        if !is_email(value.trim()) {
            self.fail(path, rule::EMAIL);
        }
    }

    /// Fails `datetime` when a date was present but could not be parsed.
    pub(crate) fn datetime(&mut self, path: &str, value: Option<&Timestamp>) {
        if value.is_some_and(|ts| ts.value().is_none()) {
            self.fail(path, rule::DATETIME);
        }
    }

    /// Fails `required` when absent, `datetime` when unparseable.
    pub(crate) fn required_datetime(&mut self, path: &str, value: Option<&Timestamp>) {
        match value {
            Some(ts) if ts.raw().trim().is_empty() => self.fail(path, rule::REQUIRED),
            Some(ts) if ts.value().is_none() => self.fail(path, rule::DATETIME),
            Some(_) => {}
            None => self.fail(path, rule::REQUIRED),
        }
    }

    /// Folds another run's failures into this one.
    pub(crate) fn merge(&mut self, other: Result<(), ValidationErrors>) {
        if let Err(errors) = other {
            self.failures.extend(errors.into_failures());
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn finish(self) -> Result<(), ValidationErrors> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.failures))
        }
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
