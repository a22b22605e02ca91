//! Conversion of raw source strings into typed attribute values.
//!
//! Two behaviours exist and are not interchangeable:
//! [`coerce_strict`] applies a fixed precedence (int, float, date, string) and is
//! used for XML attributes; [`parse_datetime_lenient`] tries a broad set of
//! date/time shapes and is used for JSON string values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::graph::AttributeValue;

static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("valid int pattern"));
static FLOAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").expect("valid float pattern"));

/// Explicit date formats tried after ISO parsing fails.
const STRICT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y.", "%d/%m/%Y"];

const LENIENT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

const LENIENT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d.%m.%Y.",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Strict coercion: integer, then float, then date, else the trimmed string.
pub fn coerce_strict(raw: &str) -> AttributeValue {
    let v = raw.trim();
    if v.is_empty() {
        return AttributeValue::String(String::new());
    }

    if INT_RE.is_match(v) {
        if let Ok(i) = v.parse::<i64>() {
            return AttributeValue::Int(i);
        }
    }

    if FLOAT_RE.is_match(v) {
        if let Ok(f) = v.parse::<f64>() {
            return AttributeValue::Float(f);
        }
    }

    if let Some(date) = parse_iso_date(v) {
        return AttributeValue::Date(date);
    }

    for fmt in STRICT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(v, fmt) {
            return AttributeValue::Date(date);
        }
    }

    AttributeValue::String(v.to_string())
}

/// ISO-8601 date or datetime, truncated to the date.
fn parse_iso_date(v: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(v, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(v, fmt).ok())
        .map(|dt| dt.date())
}

/// General date/time parse. Returns `None` for anything that is not clearly a date,
/// including bare numbers.
pub fn parse_datetime_lenient(raw: &str) -> Option<AttributeValue> {
    let v = raw.trim();
    if v.is_empty() || !v.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if INT_RE.is_match(v) || FLOAT_RE.is_match(v) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(v) {
        return Some(AttributeValue::ZonedDateTime(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(v) {
        return Some(AttributeValue::ZonedDateTime(dt));
    }
    for fmt in LENIENT_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(v, fmt) {
            return Some(AttributeValue::DateTime(dt));
        }
    }
    for fmt in LENIENT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(v, fmt) {
            return Some(AttributeValue::Date(date));
        }
    }
    None
}

/// Lenient coercion for JSON strings: a date when one parses, the original string otherwise.
pub fn coerce_lenient(raw: &str) -> AttributeValue {
    parse_datetime_lenient(raw).unwrap_or_else(|| AttributeValue::String(raw.to_string()))
}
