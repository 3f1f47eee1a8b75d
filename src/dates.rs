//! Month vocabulary and the timestamp formats used by routing and rendering.
//!
//! URLs may name a month either as a number (`03`) or as a three-letter
//! English abbreviation (`Mar`). Entries are matched against a date filter
//! through their "full time" string, `YYYYMMDDHHMMSS` in local time, so a
//! filter is just a string prefix.

use chrono::{DateTime, Local, Utc};

/// Three-letter month abbreviations, January first.
pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Normalize a URL month token to its two-digit number.
///
/// Accepts `01`..`12` and `Jan`..`Dec` (exact case). Returns `None` for
/// anything else, including `1` or `13`.
pub fn month_number(token: &str) -> Option<String> {
    if token.len() == 2 && token.bytes().all(|b| b.is_ascii_digit()) {
        let n: u32 = token.parse().ok()?;
        return (1..=12).contains(&n).then(|| token.to_string());
    }
    MONTH_NAMES
        .iter()
        .position(|name| *name == token)
        .map(|idx| format!("{:02}", idx + 1))
}

/// Three-letter name for a two-digit month number.
pub fn month_name(number: &str) -> Option<&'static str> {
    let n: usize = number.parse().ok()?;
    MONTH_NAMES.get(n.checked_sub(1)?).copied()
}

/// `YYYYMMDDHHMMSS` in local time: the string date filters match against.
pub fn fulltime(t: &DateTime<Local>) -> String {
    t.format("%Y%m%d%H%M%S").to_string()
}

/// Blog-level "last modified" stamps derived from the newest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestDates {
    /// `Tue, 05 Mar 2024` (local time)
    pub date: String,
    /// `2024-03-05T09:30:00Z` (UTC)
    pub w3cdate: String,
    /// `Tue, 05 Mar 2024 09:30 GMT` (UTC)
    pub rfc822date: String,
}

impl LatestDates {
    pub fn from_time(t: &DateTime<Local>) -> Self {
        let utc = t.with_timezone(&Utc);
        Self {
            date: t.format("%a, %d %b %Y").to_string(),
            w3cdate: utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            rfc822date: utc.format("%a, %d %b %Y %H:%M GMT").to_string(),
        }
    }
}
