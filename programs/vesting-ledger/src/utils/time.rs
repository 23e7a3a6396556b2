//! UTC timestamps over Unix milliseconds.
//! - dates parse as `YYYY-MM-DD` (UTC midnight) or RFC 3339 (`2024-01-01T10:00:00.000Z`)
//! - formatting always emits `YYYY-MM-DDTHH:MM:SS.sssZ`

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::constants::MILLIS_PER_DAY;
use crate::error::LedgerError;

/// Parse a calendar date or an RFC 3339 timestamp into Unix milliseconds.
pub fn parse_timestamp(input: &str) -> Result<i64, LedgerError> {
    let input = input.trim();
    if input.contains('T') {
        return DateTime::parse_from_rfc3339(input)
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
            .map_err(|_| LedgerError::InvalidTimestamp);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or(LedgerError::InvalidTimestamp)
}

/// Render Unix milliseconds as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn format_iso8601(ts_ms: i64) -> Result<String, LedgerError> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(LedgerError::InvalidTimestamp)
}

/// Whole days covered by `[start_ms, end_ms)`, rounded up. Zero for empty spans.
pub fn day_span_ceil(start_ms: i64, end_ms: i64) -> u64 {
    if end_ms <= start_ms {
        return 0;
    }
    let span = (end_ms as i128) - (start_ms as i128);
    let days = (span + (MILLIS_PER_DAY as i128) - 1) / (MILLIS_PER_DAY as i128);
    u64::try_from(days).unwrap_or(u64::MAX)
}
