//! Shared utility functions for the sentinel watch crates.

/// Calendar-day utility functions
pub mod dates {
    use chrono::{DateTime, Duration, NaiveDate};

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Parse a date string in "YYYY-MM-DD" format
    pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
        Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
    }

    /// Parse an ISO-8601 day or timestamp down to its calendar day.
    ///
    /// Accepts `2024-05-01`, `2024-05-01T00:00:00Z` and
    /// `2024-05-01T00:00:00.000Z`. Timestamps carrying an offset are
    /// converted to UTC before the day is taken.
    pub fn parse_iso_day(s: &str) -> anyhow::Result<NaiveDate> {
        let trimmed = s.trim();
        if trimmed.len() == 10 {
            return parse_date(trimmed);
        }
        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(dt) => Ok(dt.naive_utc().date()),
            Err(_) => {
                let head = trimmed.get(..10).unwrap_or(trimmed);
                parse_date(head)
            }
        }
    }

    /// Start of day as an RFC 3339 UTC timestamp, e.g. `2024-05-01T00:00:00Z`
    pub fn start_of_day_utc(date: &NaiveDate) -> String {
        format!("{}T00:00:00Z", format_date(date))
    }

    /// End of day as an RFC 3339 UTC timestamp, e.g. `2024-05-01T23:59:59Z`
    pub fn end_of_day_utc(date: &NaiveDate) -> String {
        format!("{}T23:59:59Z", format_date(date))
    }

    /// First day of a trailing window of `lookback_days` ending on `today`.
    ///
    /// The window `[window_start(today, n), today]` spans `n + 1` days.
    pub fn window_start(today: NaiveDate, lookback_days: u32) -> NaiveDate {
        today - Duration::days(i64::from(lookback_days))
    }

    /// Whole days from `earlier` to `later` (negative when reversed).
    pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
        (later - earlier).num_days()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::NaiveDate;

        #[test]
        fn test_format_and_parse() {
            let date = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
            let formatted = format_date(&date);
            assert_eq!(formatted, "2023-06-15");
            let parsed = parse_date(&formatted).unwrap();
            assert_eq!(parsed, date);
        }

        #[test]
        fn test_parse_iso_day_variants() {
            let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
            assert_eq!(parse_iso_day("2024-05-01").unwrap(), expected);
            assert_eq!(parse_iso_day("2024-05-01T00:00:00Z").unwrap(), expected);
            assert_eq!(parse_iso_day("2024-05-01T00:00:00.000Z").unwrap(), expected);
            // 01:30 at +02:00 is still the previous day in UTC
            assert_eq!(
                parse_iso_day("2024-05-02T01:30:00+02:00").unwrap(),
                expected
            );
            assert!(parse_iso_day("not a date").is_err());
        }

        #[test]
        fn test_window_start() {
            let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
            let start = window_start(today, 365);
            assert_eq!(start, NaiveDate::from_ymd_opt(2023, 3, 2).unwrap());
            assert_eq!(days_between(start, today), 365);
            assert_eq!(window_start(today, 0), today);
        }

        #[test]
        fn test_day_bounds() {
            let date = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
            assert_eq!(start_of_day_utc(&date), "2024-01-09T00:00:00Z");
            assert_eq!(end_of_day_utc(&date), "2024-01-09T23:59:59Z");
        }
    }
}
