//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 UTC strings with
//! millisecond precision, so lexical order in SQL equals chronological order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format for storage
pub fn to_db(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

/// Lenient parse of a client-supplied timestamp
///
/// Accepts RFC 3339 and offset-less ISO 8601 date-times (read as UTC).
pub fn parse_client_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 11, 12, 13, 14, 15).unwrap();
        assert_eq!(to_db(&a), "2024-01-02T03:04:05.000Z");
        assert_eq!(to_db(&a).len(), to_db(&b).len());
        assert!(to_db(&a) < to_db(&b));
    }

    #[test]
    fn test_db_round_trip() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap();
        assert_eq!(from_db(&to_db(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_parse_client_timestamp_with_offset() {
        let parsed = parse_client_timestamp("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_client_timestamp_without_offset() {
        let parsed = parse_client_timestamp("2024-03-01T10:00:00.250").unwrap();
        assert_eq!(parsed.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_parse_client_timestamp_rejects_garbage() {
        assert!(parse_client_timestamp("not a date").is_none());
        assert!(parse_client_timestamp("").is_none());
        assert!(parse_client_timestamp("2024-13-45T99:00:00Z").is_none());
    }
}
