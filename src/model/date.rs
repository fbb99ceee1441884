//! Feed date handling.
//!
//! Feeds carry dates in whatever format their generator felt like. A
//! [`Timestamp`] keeps the raw string next to the parsed instant so that
//! validation can tell "absent" apart from "present but unparseable".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel returned by date accessors when a feed carries no usable date.
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// RFC 2822 variants chrono's strict parser rejects.
const LENIENT_RFC2822: &[&str] = &[
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %B %Y %H:%M:%S %z",
];

const NAIVE_DATETIME: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A date as written in a feed, plus its parsed value when it parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    raw: String,
    value: Option<DateTime<Utc>>,
}

impl Timestamp {
    /// Parses `raw`, keeping it even when no known format matches.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        Self {
            value: parse_datetime(raw),
            raw: raw.to_owned(),
        }
    }

    /// The parsed instant, `None` when the raw text did not parse.
    pub fn value(&self) -> Option<DateTime<Utc>> {
        self.value
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed instant or [`EPOCH`].
    pub fn or_epoch(ts: Option<&Timestamp>) -> DateTime<Utc> {
        ts.and_then(Timestamp::value).unwrap_or(EPOCH)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            raw: value.to_rfc3339(),
            value: Some(value),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Timestamp::parse(&raw))
    }
}

/// Parses the date formats found in the wild.
///
/// Tries RFC 2822 (with the usual deviations), RFC 3339, then zone-less
/// `YYYY-MM-DD HH:MM:SS` style timestamps (taken as UTC) and bare dates.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in LENIENT_RFC2822 {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Some(dt) = parse_with_named_zone(raw) {
        return Some(dt);
    }
    for fmt in NAIVE_DATETIME {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// RFC 2822 dates ending in a zone abbreviation chrono does not know
/// (`CEST`, `AEDT`, ...). The abbreviation is read as UTC.
fn parse_with_named_zone(raw: &str) -> Option<DateTime<Utc>> {
    let (head, zone) = raw.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let rewritten = format!("{head} +0000");
    DateTime::parse_from_rfc2822(&rewritten)
        .ok()
        .or_else(|| {
            LENIENT_RFC2822
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(&rewritten, fmt).ok())
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_datetime("Mon, 02 Jan 2006 15:04:05 -0700"),
            Some(utc(2006, 1, 2, 22, 4, 5))
        );
        assert_eq!(
            parse_datetime("Tue, 10 Jun 2003 04:00:00 GMT"),
            Some(utc(2003, 6, 10, 4, 0, 0))
        );
    }

    #[test]
    fn test_rfc2822_without_seconds() {
        assert_eq!(
            parse_datetime("Tue, 10 Jun 2003 04:00 +0000"),
            Some(utc(2003, 6, 10, 4, 0, 0))
        );
    }

    #[test]
    fn test_rfc2822_unknown_zone_abbreviation() {
        assert_eq!(
            parse_datetime("Tue, 10 Jun 2003 04:00:00 CEST"),
            Some(utc(2003, 6, 10, 4, 0, 0))
        );
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            parse_datetime("2003-12-13T18:30:02Z"),
            Some(utc(2003, 12, 13, 18, 30, 2))
        );
        assert_eq!(
            parse_datetime("2003-12-13T18:30:02.25+01:00"),
            Some(utc(2003, 12, 13, 17, 30, 2) + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_naive_formats() {
        assert_eq!(
            parse_datetime("2024-01-05 10:00:00"),
            Some(utc(2024, 1, 5, 10, 0, 0))
        );
        assert_eq!(
            parse_datetime("2024-01-05T10:00:00"),
            Some(utc(2024, 1, 5, 10, 0, 0))
        );
        assert_eq!(parse_datetime("2024-01-05"), Some(utc(2024, 1, 5, 0, 0, 0)));
    }

    #[test]
    fn test_garbage_and_blank() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("   "), None);
        assert_eq!(parse_datetime("last tuesday"), None);
    }

    #[test]
    fn test_timestamp_keeps_raw() {
        let ts = Timestamp::parse("  not a date ");
        assert_eq!(ts.raw(), "not a date");
        assert_eq!(ts.value(), None);
        assert_eq!(Timestamp::or_epoch(Some(&ts)), EPOCH);
        assert_eq!(Timestamp::or_epoch(None), EPOCH);
    }

    #[test]
    fn test_timestamp_serializes_as_raw_string() {
        let ts = Timestamp::parse("Tue, 10 Jun 2003 04:00:00 GMT");
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"Tue, 10 Jun 2003 04:00:00 GMT\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_epoch_is_unix_zero() {
        assert_eq!(EPOCH.timestamp(), 0);
    }
}
