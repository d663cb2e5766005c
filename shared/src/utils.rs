// Timestamp helpers shared by the engine and its consumers.
// Human-entered times ("1 Jan 2024 00:00:00") are parsed once here and carried as DateTime<Utc>.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const HUMAN_FORMAT: &str = "%d %b %Y %H:%M:%S";

/// Parses "1 Jan 2024 00:00:00", "1 Jan 2024 00:00" or "1 Jan 2024" as UTC.
pub fn parse_human_datetime(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    for format in [HUMAN_FORMAT, "%d %b %Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    let date = NaiveDate::parse_from_str(trimmed, "%d %b %Y")
        .map_err(|e| anyhow!("Failed to parse datetime '{}': {}", s, e))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid midnight for '{}'", s))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

pub fn format_human_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(HUMAN_FORMAT).to_string()
}
