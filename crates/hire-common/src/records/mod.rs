//! Typed entity records and the header-name schemas used to write them.
//!
//! Every record declares an ordered list of `(header, cell)` pairs. Writers
//! resolve those headers against the live table, so column order in the
//! store never matters.

use crate::workbook::Cell;

pub mod archive;
pub mod candidate;
pub mod engagement;
pub mod evaluation;
pub mod insight;
pub mod processing;
pub mod scores;
pub mod survey;
pub mod workflow;

pub use archive::ArchiveRecord;
pub use candidate::{CandidateRecord, CandidateStatus};
pub use engagement::{EngagementRecord, EngagementStrategy};
pub use evaluation::EvaluationRecord;
pub use insight::InsightRecord;
pub use processing::{ProcessingLogEntry, ProcessingStatus};
pub use scores::ScoreSnapshotRecord;
pub use survey::{SendStatus, SurveyResponseRecord, SurveySendRecord};
pub use workflow::WorkflowLogRecord;

/// Header-addressed row schema for one table.
pub trait RowSchema {
    const TABLE: &'static str;

    /// Ordered `(header, value)` pairs this record writes.
    fn cells(&self) -> Vec<(&'static str, Cell)>;
}

/// Records written through the keyed upsert path.
pub trait Keyed: RowSchema {
    const KEY: &'static str;

    fn key(&self) -> &str;
}

/// Deserializers that accept what upstream workflow tools actually send:
/// numbers as strings, strings as numbers, blanks as absent.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::workbook::parse_number;

    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::Bool(flag)) => Some(flag.to_string()),
            _ => None,
        })
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_string(deserializer)?.unwrap_or_default())
    }

    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => parse_number(&text),
            _ => None,
        })
    }

    /// A list of strings, or a single string treated as a one-element list.
    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) if !text.trim().is_empty() => Some(text),
                    Value::Null => None,
                    Value::String(_) => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(text)) if !text.trim().is_empty() => vec![text],
            _ => Vec::new(),
        })
    }
}

/// First present name. `氏名` is listed first wherever a record accepts it.
pub(crate) fn preferred_name<'a>(names: &[&'a Option<String>]) -> Option<&'a str> {
    names.iter().find_map(|name| name.as_deref())
}

pub(crate) fn text(value: &Option<String>) -> Cell {
    Cell::from_opt_str(value.as_deref())
}

pub(crate) fn number(value: Option<f64>) -> Cell {
    Cell::from_opt_f64(value)
}
