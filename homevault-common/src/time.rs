//! Timestamp utilities
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision and a `Z` suffix, so lexical order in SQLite equals chronological order.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp, truncated to the precision stored in the database
pub fn now() -> DateTime<Utc> {
    truncate_to_micros(Utc::now())
}

/// Format a timestamp for storage
pub fn to_db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Milliseconds since the Unix epoch (used for blob name disambiguation)
pub fn unix_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_db_timestamp_roundtrip_is_exact() {
        let ts = now();
        let parsed = parse_db_timestamp(&to_db_timestamp(ts)).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_db_timestamp_is_fixed_width_and_sortable() {
        let earlier = now();
        let later = earlier + Duration::milliseconds(1500);
        let a = to_db_timestamp(earlier);
        let b = to_db_timestamp(later);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_db_timestamp("yesterday").is_err());
    }
}
