//! Date helpers shared by the store and the reminder jobs.

use chrono::{Duration, NaiveDate, Utc};

/// Storage format for calendar dates (sorts lexically)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage format for timestamps (sorts lexically, compares against DATE_FORMAT)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `date` shifted by `days`. Errors instead of overflowing the calendar range.
pub fn add_days(date: NaiveDate, days: i64) -> anyhow::Result<NaiveDate> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| anyhow::anyhow!("Date {} shifted by {} days is out of range", date, days))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_days_crosses_month() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        assert_eq!(format_date(add_days(date, 3).unwrap()), "2026-02-02");
        assert_eq!(format_date(add_days(date, -30).unwrap()), "2025-12-31");
    }

    #[test]
    fn test_add_days_out_of_range_is_an_error() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        assert!(add_days(date, 1_000_000_000).is_err());
        assert!(add_days(date, -1_000_000_000).is_err());
        assert!(add_days(date, i64::MAX).is_err());
    }

    #[test]
    fn test_timestamp_sorts_against_date() {
        // "modified < cutoff" compares a timestamp column with a bare date
        assert!("2026-03-01 23:59:59" < "2026-03-02");
        assert!("2026-03-02 00:00:00" >= "2026-03-02");
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-10-17").unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
        );
        assert!(parse_date("17/10/2026").is_err());
    }
}
