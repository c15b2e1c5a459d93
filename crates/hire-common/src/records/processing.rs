use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::AsRefStr;

use super::RowSchema;
use crate::ids;
use crate::schema::PROCESSING_LOG;
use crate::workbook::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Success,
    Failed,
}

/// One audit row in the processing log.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingLogEntry {
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub candidate: String,
    pub event: String,
    pub status: ProcessingStatus,
    pub detail: String,
    pub error: String,
    pub notes: String,
}

impl Default for ProcessingLogEntry {
    fn default() -> Self {
        Self {
            timestamp: DateTime::<Utc>::default(),
            phase: String::new(),
            candidate: String::new(),
            event: String::new(),
            status: ProcessingStatus::Success,
            detail: String::new(),
            error: String::new(),
            notes: String::new(),
        }
    }
}

impl RowSchema for ProcessingLogEntry {
    const TABLE: &'static str = PROCESSING_LOG;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("timestamp", Cell::Timestamp(self.timestamp)),
            ("phase", Cell::text(&self.phase)),
            ("candidate", Cell::text(&self.candidate)),
            ("event", Cell::text(&self.event)),
            ("status", Cell::text(self.status.as_ref())),
            ("detail", Cell::from_opt_str(Some(self.detail.as_str()))),
            ("error", Cell::from_opt_str(Some(self.error.as_str()))),
            ("notes", Cell::from_opt_str(Some(self.notes.as_str()))),
            ("run_id", Cell::text(ids::run_id())),
        ]
    }
}
