use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::models::service_date::ServiceDate;

/// Values extraction providers emit when they found no date.
const EMPTY_MARKERS: &[&str] = &["", "null", "none", "n/a", "na", "unknown", "not_found", "-"];

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

static NUMERIC_MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/-](\d{4})$").unwrap());

static ISO_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})$").unwrap());

/// Day-level formats, tried in order. US slash format wins over European.
const DAY_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%d/%m/%Y",
];

/// Years outside this range come from a format matching the wrong fields
/// ("March 2024" read as March 20, year 24) and are rejected.
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

/// Normalize a date string from extraction output.
///
/// Accepts ISO, US slash dates, long-form month names ("March 14, 2024",
/// "14 Mar 2024") and month-only dates ("March 2024", "03/2024", "2024-03").
/// Text that matches none of these is kept verbatim, padding included, as
/// `Unparsed`.
pub fn normalize_date(raw: &str) -> ServiceDate {
    let trimmed = raw.trim();
    if EMPTY_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
        return ServiceDate::Unknown;
    }

    if let Some(day) = parse_day(trimmed) {
        return ServiceDate::Day(day);
    }
    if let Some((year, month)) = parse_month(trimmed) {
        return ServiceDate::Month { year, month };
    }

    ServiceDate::Unparsed(raw.to_string())
}

/// Normalize an optional value; absent input is `Unknown`.
pub fn normalize_optional_date(raw: Option<&str>) -> ServiceDate {
    raw.map(normalize_date).unwrap_or(ServiceDate::Unknown)
}

fn parse_day(text: &str) -> Option<NaiveDate> {
    // "2024-03-14T09:30:00" and "2024-03-14 09:30"
    let date_part = match text.find(['T', ' ']) {
        Some(idx) if idx == 10 && text.as_bytes()[4] == b'-' => &text[..idx],
        _ => text,
    };

    let cleaned = clean_long_form(date_part);
    DAY_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&cleaned, fmt)
            .ok()
            .filter(|d| PLAUSIBLE_YEARS.contains(&d.year()))
    })
}

fn parse_month(text: &str) -> Option<(i32, u32)> {
    if let Some(caps) = NUMERIC_MONTH_YEAR.captures(text) {
        return valid_month(caps[2].parse().ok()?, caps[1].parse().ok()?);
    }
    if let Some(caps) = ISO_MONTH.captures(text) {
        return valid_month(caps[1].parse().ok()?, caps[2].parse().ok()?);
    }

    // "March 2024", "Mar. 2024": anchor to the first of the month.
    let cleaned = clean_long_form(text);
    ["%d %B %Y", "%d %B, %Y"].iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&format!("1 {cleaned}"), fmt)
            .ok()
            .filter(|d| PLAUSIBLE_YEARS.contains(&d.year()))
            .map(|d| (d.year(), d.month()))
    })
}

fn valid_month(year: i32, month: u32) -> Option<(i32, u32)> {
    if !PLAUSIBLE_YEARS.contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1).map(|_| (year, month))
}

/// Strip ordinal suffixes and abbreviation dots: "Mar. 14th, 2024" -> "Mar 14, 2024".
fn clean_long_form(text: &str) -> String {
    let no_ordinals = ORDINAL_SUFFIX.replace_all(text, "$1");
    no_ordinals
        .replace('.', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ,", ",")
}
