//! Campaign window and date parsing
//!
//! The campaign window bounds which runs count towards the leaderboard total.
//! Dates arrive as loose strings from the command line and configuration.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Parse `YYYY-MM-DD` or `DD-MM-YYYY` to midnight UTC in epoch seconds
pub fn parse_date_to_epoch(input: &str) -> Option<i64> {
    parse_date(input).map(midnight_epoch)
}

/// Parse a calendar date in either supported layout
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    let bytes = input.as_bytes();
    if bytes.len() != 10 {
        return None;
    }

    if bytes[4] == b'-' && bytes[7] == b'-' {
        NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()
    } else if bytes[2] == b'-' && bytes[5] == b'-' {
        NaiveDate::parse_from_str(input, "%d-%m-%Y").ok()
    } else {
        None
    }
}

/// Parse a projection target; RFC 3339 timestamps and plain dates are accepted.
///
/// Anything unparsable yields `fallback`.
pub fn parse_target_to_epoch(input: Option<&str>, fallback: i64) -> i64 {
    let Some(input) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback;
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return dt.timestamp();
    }

    parse_date_to_epoch(input).unwrap_or(fallback)
}

/// Midnight UTC of `date` in epoch seconds
pub fn midnight_epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_since_monday = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(days_since_monday))
        .unwrap_or(date)
}

/// `YYYY-MM` key for the month containing `date`
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// `YYYY-MM` key for the month containing `now`
pub fn current_month_key(now: DateTime<Utc>) -> String {
    month_key(now.date_naive())
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// "March 2026" for the key "2026-03"
pub fn month_label(key: &str) -> String {
    let mut parts = key.splitn(2, '-');
    let year = parts.next().unwrap_or("");
    let month: usize = parts.next().and_then(|m| m.parse().ok()).unwrap_or(1);
    let name = MONTH_NAMES[month.clamp(1, 12) - 1];
    format!("{} {}", name, year)
}

/// Time bounds, in epoch seconds, for runs that count towards the total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignWindow {
    /// Inclusive lower bound
    pub after: Option<i64>,

    /// Exclusive upper bound
    pub before: Option<i64>,
}

impl CampaignWindow {
    /// Combine a requested `after` with the campaign start; the later one wins
    pub fn resolve(after: Option<i64>, before: Option<i64>, campaign_start: Option<i64>) -> Self {
        let after = match (after, campaign_start) {
            (Some(requested), Some(start)) => Some(requested.max(start)),
            (requested, start) => requested.or(start),
        };

        CampaignWindow { after, before }
    }

    /// Whether a timestamp in milliseconds falls inside the window
    pub fn contains(&self, ts_ms: i64) -> bool {
        let after_ok = self.after.map_or(true, |after| ts_ms >= after * 1000);
        let before_ok = self.before.map_or(true, |before| ts_ms < before * 1000);
        after_ok && before_ok
    }
}
