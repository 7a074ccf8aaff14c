//! Epoch-millisecond helpers.

use crate::error::{CoreError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parse an RFC3339 timestamp (or `YYYY-MM-DD HH:MM:SS` in UTC) into epoch ms.
pub fn parse_epoch_ms(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp_millis());
    }
    // "2024-07-31 00:00:00Z" style, with or without the trailing zone marker
    let naive_input = trimmed.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive_input, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
        .map_err(|e| CoreError::InvalidTimestamp {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Convert epoch ms to a UTC datetime.
pub fn from_epoch_ms(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(CoreError::TimestampOutOfRange(ms))
}

/// `YYYY-MM-DD` bucket of an epoch-ms timestamp.
pub fn date_bucket(ms: i64) -> Result<String> {
    Ok(from_epoch_ms(ms)?.format("%Y-%m-%d").to_string())
}

/// `YYYY-MM` bucket of an epoch-ms timestamp.
pub fn month_bucket(ms: i64) -> Result<String> {
    Ok(from_epoch_ms(ms)?.format("%Y-%m").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_epoch_ms("2024-07-31T00:00:00Z").unwrap(), 1_722_384_000_000);
    }

    #[test]
    fn test_parse_space_separated() {
        assert_eq!(
            parse_epoch_ms("2024-07-31 00:00:00Z").unwrap(),
            parse_epoch_ms("2024-07-31T00:00:00Z").unwrap()
        );
        assert_eq!(
            parse_epoch_ms("2025-07-31 23:59:59Z").unwrap(),
            1_754_006_399_000
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_epoch_ms("yesterday"),
            Err(CoreError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_buckets() {
        let ms = 1_722_384_000_000; // 2024-07-31
        assert_eq!(date_bucket(ms).unwrap(), "2024-07-31");
        assert_eq!(month_bucket(ms).unwrap(), "2024-07");
    }
}
