use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use super::{RowSchema, lenient, number, text};
use crate::schema::{SURVEY_RESPONSE, SURVEY_SEND_LOG};
use crate::workbook::Cell;

/// Outcome reported by the mail dispatcher for one survey send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendStatus {
    #[default]
    #[serde(alias = "SUCCESS", alias = "成功")]
    Success,
    #[serde(alias = "FAILURE", alias = "failed", alias = "失敗")]
    Failure,
}

impl SendStatus {
    /// Reads a stored cell; anything that is not a recognised success is a failure.
    pub fn from_cell(cell: &Cell) -> Self {
        match cell.display().trim() {
            "success" | "SUCCESS" | "成功" => SendStatus::Success,
            _ => SendStatus::Failure,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurveySendRecord {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub send_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub phase: String,
    pub send_time: Option<DateTime<Utc>>,
    pub send_status: SendStatus,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub error_message: Option<String>,
}

impl RowSchema for SurveySendRecord {
    const TABLE: &'static str = SURVEY_SEND_LOG;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("send_id", text(&self.send_id)),
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            ("candidate_name", text(&self.candidate_name)),
            ("email", text(&self.email)),
            ("phase", Cell::text(self.phase.trim())),
            ("send_time", self.send_time.map(Cell::Timestamp).unwrap_or_default()),
            ("send_status", Cell::text(self.send_status.as_ref())),
            ("error_message", text(&self.error_message)),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurveyResponseRecord {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub response_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub phase: String,
    pub response_time: Option<DateTime<Utc>>,
    /// 志望度 (1–10)
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub aspiration: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub concerns: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub other_companies: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub comments: Option<String>,
}

impl RowSchema for SurveyResponseRecord {
    const TABLE: &'static str = SURVEY_RESPONSE;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("response_id", text(&self.response_id)),
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            ("candidate_name", text(&self.candidate_name)),
            ("phase", Cell::text(self.phase.trim())),
            (
                "response_time",
                self.response_time.map(Cell::Timestamp).unwrap_or_default(),
            ),
            ("aspiration", number(self.aspiration)),
            ("concerns", text(&self.concerns)),
            ("other_companies", text(&self.other_companies)),
            ("comments", text(&self.comments)),
        ]
    }
}
