use serde::Deserialize;

use super::{Keyed, RowSchema, lenient, number, preferred_name, text};
use crate::schema::{CANDIDATE_ID, CANDIDATES_MASTER};
use crate::workbook::Cell;

/// 選考ステータス。未知の値はそのまま保持する。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum CandidateStatus {
    CasualInterview,
    FirstInterview,
    SecondInterview,
    FinalInterview,
    Offer,
    Accepted,
    Declined,
    Rejected,
    Other(String),
}

impl CandidateStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "casual_interview" | "面談" | "カジュアル面談" => Self::CasualInterview,
            "first_interview" | "1次面接" | "一次面接" => Self::FirstInterview,
            "second_interview" | "2次面接" | "二次面接" => Self::SecondInterview,
            "final_interview" | "最終面接" => Self::FinalInterview,
            "offer" | "内定" | "内定通知済" => Self::Offer,
            "accepted" | "承諾" | "内定承諾" => Self::Accepted,
            "declined" | "辞退" => Self::Declined,
            "rejected" | "見送り" | "不合格" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::CasualInterview => "casual_interview",
            Self::FirstInterview => "first_interview",
            Self::SecondInterview => "second_interview",
            Self::FinalInterview => "final_interview",
            Self::Offer => "offer",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Rejected => "rejected",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<String> for CandidateStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

/// `candidates_master` section: the profile half of the master row.
///
/// Latest/previous probabilities, axis scores, rank and interview count are
/// owned by the rollup engine and are deliberately absent here, so an upsert
/// never clobbers them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(rename = "氏名", deserialize_with = "lenient::opt_string")]
    pub registered_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(alias = "現在ステータス", alias = "current_status")]
    pub status: Option<CandidateStatus>,
    #[serde(alias = "採用区分", alias = "recruit_type", deserialize_with = "lenient::opt_string")]
    pub category: Option<String>,
    #[serde(alias = "メールアドレス", deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(alias = "担当面接官", deserialize_with = "lenient::opt_string")]
    pub interviewer: Option<String>,
    #[serde(alias = "応募日", deserialize_with = "lenient::opt_string")]
    pub applied_at: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub latest_acceptance_human: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub engagement_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub urgency_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub core_motivation: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub top_concern: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_action: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub action_deadline: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub action_priority: Option<String>,
}

impl CandidateRecord {
    pub fn display_name(&self) -> Option<&str> {
        preferred_name(&[&self.registered_name, &self.name, &self.candidate_name])
    }
}

impl RowSchema for CandidateRecord {
    const TABLE: &'static str = CANDIDATES_MASTER;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            ("name", Cell::from_opt_str(self.display_name())),
            (
                "status",
                Cell::from_opt_str(self.status.as_ref().map(CandidateStatus::as_str)),
            ),
            ("category", text(&self.category)),
            ("email", text(&self.email)),
            ("interviewer", text(&self.interviewer)),
            ("applied_at", Cell::from_opt_timestamp_text(self.applied_at.as_deref())),
            ("latest_acceptance_human", number(self.latest_acceptance_human)),
            ("engagement_score", number(self.engagement_score)),
            ("urgency_score", number(self.urgency_score)),
            ("core_motivation", text(&self.core_motivation)),
            ("top_concern", text(&self.top_concern)),
            ("next_action", text(&self.next_action)),
            ("action_deadline", text(&self.action_deadline)),
            ("action_priority", text(&self.action_priority)),
        ]
    }
}

impl Keyed for CandidateRecord {
    const KEY: &'static str = CANDIDATE_ID;

    fn key(&self) -> &str {
        self.candidate_id.trim()
    }
}
