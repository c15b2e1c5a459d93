use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timezone::BUSINESS_TIMEZONE;

/// A single cell value in a workbook table.
///
/// Stored form is adjacently tagged so that a text cell that happens to look
/// like a timestamp survives a round trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse a timestamp as written by people or upstream tools.
///
/// RFC 3339 values keep their offset; naive values are read as business
/// (Asia/Tokyo) local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    BUSINESS_TIMEZONE
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Parse a numeric cell, tolerating a trailing percent sign (`"65%"`).
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// `None` and blank strings become [`Cell::Empty`].
    pub fn from_opt_str(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(text) if !text.is_empty() => Cell::Text(text.to_string()),
            _ => Cell::Empty,
        }
    }

    pub fn from_opt_f64(value: Option<f64>) -> Self {
        value.map(Cell::Number).unwrap_or_default()
    }

    /// Timestamp-ish text is stored as a timestamp when it parses, verbatim otherwise.
    pub fn from_opt_timestamp_text(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(text) if !text.is_empty() => parse_timestamp(text)
                .map(Cell::Timestamp)
                .unwrap_or_else(|| Cell::Text(text.to_string())),
            _ => Cell::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Human-facing rendering, also used for key comparison.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(text) => text.clone(),
            Cell::Number(value) => format_number(*value),
            Cell::Bool(flag) => flag.to_string(),
            Cell::Timestamp(at) => at.to_rfc3339(),
        }
    }

    pub fn as_text(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.display())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => parse_number(text),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Cell::Timestamp(at) => Some(*at),
            Cell::Text(text) => parse_timestamp(text),
            _ => None,
        }
    }

    /// Key columns compare on trimmed display text so `"42"` matches `42`.
    pub fn matches_key(&self, key: &str) -> bool {
        !self.is_empty() && self.display().trim() == key.trim()
    }

    /// Plain JSON rendering for API responses.
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Text(text) => Value::String(text.clone()),
            Cell::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Bool(flag) => Value::Bool(*flag),
            Cell::Timestamp(at) => Value::String(at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_naive_tokyo_times() {
        let rfc = parse_timestamp("2024-04-01T10:00:00Z").unwrap();
        assert_eq!(rfc, Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap());

        // 19:00 JST == 10:00 UTC
        let naive = parse_timestamp("2024/04/01 19:00").unwrap();
        assert_eq!(naive, rfc);

        let date_only = parse_timestamp("2024-04-02").unwrap();
        assert_eq!(date_only, Utc.with_ymd_and_hms(2024, 4, 1, 15, 0, 0).unwrap());

        assert!(parse_timestamp("next tuesday").is_none());
        assert!(parse_timestamp("   ").is_none());
    }

    #[test]
    fn numbers_tolerate_percent_suffix() {
        assert_eq!(Cell::text("65%").as_f64(), Some(65.0));
        assert_eq!(Cell::text(" 72.5 ").as_f64(), Some(72.5));
        assert_eq!(Cell::text("n/a").as_f64(), None);
        assert_eq!(Cell::Bool(true).as_f64(), None);
    }

    #[test]
    fn key_matching_uses_display_text() {
        assert!(Cell::Number(42.0).matches_key("42"));
        assert!(Cell::text(" C-001 ").matches_key("C-001"));
        assert!(!Cell::Empty.matches_key(""));
    }

    #[test]
    fn text_that_looks_like_a_date_survives_serde() {
        let cell = Cell::text("2024-04-01T10:00:00Z");
        let encoded = serde_json::to_value(&cell).unwrap();
        let decoded: Cell = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, cell);
    }
}
