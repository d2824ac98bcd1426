//! Timestamp extraction for date-range filtering.
//!
//! Log lines carry their timestamp somewhere near the front in one of a handful of
//! common layouts. Extraction scans a bounded prefix for the first layout that
//! matches and normalizes the result to a `NaiveDateTime` (UTC when the line carries an offset).

use crate::error::{Result, SiftError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// How far into a line we look for a timestamp
const SCAN_PREFIX_CHARS: usize = 160;

#[derive(Debug, Clone, Copy)]
enum Layout {
    /// `2024-09-02T10:15:00.123Z`, `2024-09-02 10:15:00,123`, with optional offset
    Iso,
    /// `2024/09/02 10:15:00`
    Slashed,
    /// `02/Sep/2024:10:15:00 +0000` (Apache/NGINX access logs)
    Common,
}

fn layouts() -> &'static [(Regex, Layout)] {
    static LAYOUTS: OnceLock<Vec<(Regex, Layout)>> = OnceLock::new();
    LAYOUTS.get_or_init(|| {
        [
            (
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
                Layout::Iso,
            ),
            (r"\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}", Layout::Slashed),
            (
                r"\d{2}/[A-Z][a-z]{2}/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d{4}",
                Layout::Common,
            ),
        ]
        .into_iter()
        .filter_map(|(pattern, layout)| match Regex::new(pattern) {
            Ok(regex) => Some((regex, layout)),
            Err(err) => {
                log::error!("timestamp layout failed to compile: {err}");
                None
            }
        })
        .collect()
    })
}

/// Find and parse the first timestamp in `line`.
pub fn extract(line: &str) -> Option<NaiveDateTime> {
    let prefix = match line.char_indices().nth(SCAN_PREFIX_CHARS) {
        Some((idx, _)) => &line[..idx],
        None => line,
    };

    layouts().iter().find_map(|(regex, layout)| {
        let found = regex.find(prefix)?;
        parse_layout(found.as_str(), *layout)
    })
}

fn parse_layout(text: &str, layout: Layout) -> Option<NaiveDateTime> {
    match layout {
        Layout::Iso => parse_iso(text),
        Layout::Slashed => NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M:%S").ok(),
        Layout::Common => DateTime::parse_from_str(text, "%d/%b/%Y:%H:%M:%S %z")
            .ok()
            .map(|dt| dt.naive_utc()),
    }
}

fn parse_iso(text: &str) -> Option<NaiveDateTime> {
    let mut normalized = text.replace(',', ".");
    if normalized.as_bytes().get(10) == Some(&b' ') {
        normalized.replace_range(10..11, "T");
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Parse a user-supplied bound such as `2024-09-02`, `2024-09-02 10:00:00`
/// or any layout accepted by [`extract`].
pub fn parse_bound(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    if let Some(parsed) = extract(trimmed) {
        return Ok(parsed);
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| SiftError::InvalidTimestamp {
            value: value.to_string(),
        })
}
