use chrono::{DateTime, Utc};

use super::{Keyed, RowSchema, number, text};
use crate::schema::{ARCHIVE, CANDIDATE_ID};
use crate::workbook::Cell;

/// Snapshot of an accepted candidate, copied from the master row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveRecord {
    pub candidate_id: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub accepted_at: DateTime<Utc>,
    pub final_pass_probability: Option<f64>,
    pub final_acceptance_probability: Option<f64>,
    pub final_rank: Option<String>,
    pub interview_count: Option<f64>,
    pub archived_at: DateTime<Utc>,
}

impl RowSchema for ArchiveRecord {
    const TABLE: &'static str = ARCHIVE;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            ("name", text(&self.name)),
            ("category", text(&self.category)),
            ("accepted_at", Cell::Timestamp(self.accepted_at)),
            ("final_pass_probability", number(self.final_pass_probability)),
            (
                "final_acceptance_probability",
                number(self.final_acceptance_probability),
            ),
            ("final_rank", text(&self.final_rank)),
            ("interview_count", number(self.interview_count)),
            ("archived_at", Cell::Timestamp(self.archived_at)),
        ]
    }
}

impl Keyed for ArchiveRecord {
    const KEY: &'static str = CANDIDATE_ID;

    fn key(&self) -> &str {
        self.candidate_id.trim()
    }
}
