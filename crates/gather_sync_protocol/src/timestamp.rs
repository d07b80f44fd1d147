//! Timestamp parsing and ordering for last-writer-wins.
//!
//! Merge correctness depends entirely on accurate chronological ordering, so
//! timestamps are parsed as RFC 3339 and compared as instants. A value that
//! does not parse loses to any value that does: the conservative outcome is
//! to favor the side whose clock we can actually read.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Parses an RFC 3339 / ISO-8601 timestamp string.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Compares two timestamp strings chronologically.
///
/// Unparseable values order before parseable ones; two unparseable values
/// compare equal.
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Returns true if the server wrote strictly after the local side.
///
/// `local_updated_at` is the entity's own `updatedAt` string, if present.
/// Ties favor local. A missing or unparseable local timestamp loses: the
/// server snapshot is then the only write we can order.
pub fn server_is_newer(local_updated_at: Option<&str>, server_timestamp: DateTime<Utc>) -> bool {
    match local_updated_at.and_then(parse_timestamp) {
        Some(local) => server_timestamp > local,
        // No usable local clock: the server snapshot is the only ordered write.
        None => true,
    }
}
