//! Persistence module.
//!
//! The YAML document on disk is the source of truth; there is no in-memory cache.

mod document;
mod json_store;

pub use document::*;
pub use json_store::*;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Wire format of modification timestamps (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DDTHH:MM:SSZ` timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        let ts = parse_timestamp("2026-01-07T12:34:56Z").unwrap();
        assert_eq!(ts.timestamp(), 1_767_789_296);
        assert_eq!(format_timestamp(&ts), "2026-01-07T12:34:56Z");
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(parse_timestamp("2026-01-07 12:34:56").is_none());
        assert!(parse_timestamp("2026-01-07T12:34:56+00:00").is_none());
        assert!(parse_timestamp("Wed, 07 Jan 2026 12:34:56 GMT").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
