use serde::Deserialize;
use serde_json::Value;

use super::{RowSchema, lenient, text};
use crate::schema::WORKFLOW_LOG;
use crate::workbook::Cell;

pub const DEFAULT_WORKFLOW_NAME: &str = "Phase1_Workflow";
pub const DEFAULT_WORKFLOW_STATUS: &str = "SUCCESS";
const SUMMARY_MAX_CHARS: usize = 200;

/// `workflow_log` section: one run of the upstream workflow.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowLogRecord {
    #[serde(alias = "workflow_log_id", deserialize_with = "lenient::opt_string")]
    pub workflow_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub workflow_name: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub execution_date: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub duration_seconds: Option<f64>,
    /// Measured by the ingestion pipeline; used when the workflow reports no duration.
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub execution_time_seconds: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub input_summary: Option<String>,
    pub input: Option<Value>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub output_summary: Option<String>,
    pub output: Option<Value>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub error_message: Option<String>,
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn summary(explicit: &Option<String>, raw: &Option<Value>) -> Cell {
    if let Some(summary) = explicit {
        return Cell::text(summary.clone());
    }
    let json = raw
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_else(|| "{}".to_string());
    Cell::Text(truncate_chars(&json, SUMMARY_MAX_CHARS))
}

impl RowSchema for WorkflowLogRecord {
    const TABLE: &'static str = WORKFLOW_LOG;

    /// `workflow_log_id` and `execution_date` are filled by the writer when absent.
    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("workflow_log_id", text(&self.workflow_id)),
            (
                "workflow_name",
                Cell::text(self.workflow_name.as_deref().unwrap_or(DEFAULT_WORKFLOW_NAME)),
            ),
            ("candidate_id", Cell::from_opt_str(Some(self.candidate_id.as_str()))),
            (
                "execution_date",
                Cell::from_opt_timestamp_text(self.execution_date.as_deref()),
            ),
            (
                "status",
                Cell::text(self.status.as_deref().unwrap_or(DEFAULT_WORKFLOW_STATUS)),
            ),
            (
                "duration_seconds",
                Cell::Number(
                    self.duration_seconds
                        .or(self.execution_time_seconds)
                        .unwrap_or(0.0),
                ),
            ),
            ("input_summary", summary(&self.input_summary, &self.input)),
            ("output_summary", summary(&self.output_summary, &self.output)),
            ("error_message", text(&self.error_message)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn summaries_fall_back_to_truncated_json() {
        let long = "x".repeat(500);
        let record = WorkflowLogRecord {
            input: Some(json!({ "text": long })),
            ..Default::default()
        };
        let cells: std::collections::HashMap<_, _> = record.cells().into_iter().collect();

        let Cell::Text(input) = &cells["input_summary"] else {
            panic!("expected text summary");
        };
        assert_eq!(input.chars().count(), SUMMARY_MAX_CHARS);
        assert_eq!(cells["output_summary"], Cell::text("{}"));
        assert_eq!(cells["workflow_name"], Cell::text(DEFAULT_WORKFLOW_NAME));
        assert_eq!(cells["status"], Cell::text(DEFAULT_WORKFLOW_STATUS));
    }

    #[test]
    fn measured_time_is_used_only_without_reported_duration() {
        let measured = WorkflowLogRecord {
            execution_time_seconds: Some(1.25),
            ..Default::default()
        };
        let reported = WorkflowLogRecord {
            duration_seconds: Some(9.0),
            execution_time_seconds: Some(1.25),
            ..Default::default()
        };
        let get = |r: &WorkflowLogRecord| {
            r.cells()
                .into_iter()
                .find(|(h, _)| *h == "duration_seconds")
                .map(|(_, c)| c)
                .unwrap()
        };
        assert_eq!(get(&measured), Cell::Number(1.25));
        assert_eq!(get(&reported), Cell::Number(9.0));
    }
}
