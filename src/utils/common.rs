//! Common utility functions

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Timestamp format used inside the database document
pub const DOCUMENT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Accepted fallback when a writer omitted the UTC marker
const NAIVE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Convert DateTime to document string format, always suffixed with `Z`
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DOCUMENT_DATE_FORMAT).to_string()
}

/// Parse a document timestamp
///
/// Accepts RFC 3339 with any offset (normalized to UTC) and the bare
/// `YYYY-MM-DDTHH:MM:SS` form, which is taken as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(truncate_to_seconds(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(s, NAIVE_DATE_FORMAT)
        .ok()
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}

/// Drop sub-second precision; the document format stores whole seconds
pub fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(0)
}

/// Get current UTC datetime at whole-second precision
pub fn now() -> DateTime<Utc> {
    truncate_to_seconds(Utc::now())
}
