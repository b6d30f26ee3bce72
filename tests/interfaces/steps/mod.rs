//! Cucumber step definitions for interface tests.

pub mod leaderboard;
pub mod search_index;

use chrono::{DateTime, NaiveDate, Utc};

/// Midnight UTC of a `yyyy-MM-dd` date.
pub fn parse_day(s: &str) -> DateTime<Utc> {
    parse_date(s)
        .and_hms_opt(0, 0, 0)
        .expect("Invalid time")
        .and_utc()
}

pub fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("Invalid date")
}
