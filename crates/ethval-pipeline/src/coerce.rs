//! Coercion of loosely typed provider values.
//!
//! Providers disagree on representation: numbers arrive as JSON numbers or
//! as decimal strings, dates as epoch seconds, epoch milliseconds or ISO
//! text. Everything funnels through here so the rest of the pipeline only
//! sees `f64` and [`NaiveDate`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// How a date field is encoded in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// Unix seconds, as a number or numeric string.
    EpochSeconds,
    /// Unix milliseconds, as a number or numeric string.
    EpochMillis,
    /// `YYYY-MM-DD` or an ISO-8601 timestamp.
    Iso,
}

/// A finite number from a JSON number or a numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Calendar day (UTC) of a Unix timestamp in seconds.
pub fn day_from_epoch_seconds(secs: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

/// Calendar day (UTC) of a Unix timestamp in milliseconds.
pub fn day_from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Calendar day of an ISO date or timestamp.
///
/// Timestamps with an offset are converted to UTC first; naive
/// timestamps are taken as UTC.
pub fn day_from_iso(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Calendar day of a payload date field.
pub fn to_day(value: &Value, format: DateFormat) -> Option<NaiveDate> {
    match format {
        DateFormat::EpochSeconds => day_from_epoch_seconds(number(value)? as i64),
        DateFormat::EpochMillis => day_from_epoch_millis(number(value)? as i64),
        DateFormat::Iso => day_from_iso(value.as_str()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_number() {
        assert_eq!(number(&json!(1.5)), Some(1.5));
        assert_eq!(number(&json!(42)), Some(42.0));
        assert_eq!(number(&json!(" 3.25 ")), Some(3.25));
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!("inf")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!({"v": 1})), None);
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(
            to_day(&json!(1700000000000i64), DateFormat::EpochMillis),
            Some(day(2023, 11, 14))
        );
    }

    #[test]
    fn test_epoch_seconds_from_string() {
        // Fear & greed delivers timestamps as strings.
        assert_eq!(
            to_day(&json!("1700000000"), DateFormat::EpochSeconds),
            Some(day(2023, 11, 14))
        );
    }

    #[test]
    fn test_iso_variants() {
        assert_eq!(day_from_iso("2024-01-01"), Some(day(2024, 1, 1)));
        assert_eq!(day_from_iso("2024-01-01T08:00:00.000Z"), Some(day(2024, 1, 1)));
        assert_eq!(day_from_iso("2024-01-01T23:30:00"), Some(day(2024, 1, 1)));
        // 01:00 at +02:00 is the previous day in UTC.
        assert_eq!(day_from_iso("2024-01-02T01:00:00+02:00"), Some(day(2024, 1, 1)));
        assert_eq!(day_from_iso("not a date"), None);
    }

    #[test]
    fn test_iso_rejects_numbers() {
        assert_eq!(to_day(&json!(20240101), DateFormat::Iso), None);
    }
}
