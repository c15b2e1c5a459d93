use serde::Deserialize;

use super::{RowSchema, lenient, number, text};
use crate::schema::EVALUATION_MASTER;
use crate::workbook::Cell;

/// `evaluation_master` section: one interview evaluation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvaluationRecord {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub interview_datetime: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub recruit_type: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub selection_phase: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub philosophy_rank: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub philosophy_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub philosophy_reason: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub strategy_rank: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub strategy_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub strategy_reason: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub motivation_rank: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub motivation_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub motivation_reason: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub execution_rank: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub execution_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub execution_reason: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub total_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub total_rank: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub pass_probability: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub recommendation: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub transcript: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub interview_memo: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub concerns: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_check_points: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_question_1: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_question_2: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_question_3: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_question_4: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_question_5: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub competitor_analysis: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub evaluation_report_url: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub strategy_report_url: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub workflow_id: Option<String>,
}

/// Scored evaluation axes, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Philosophy,
    Strategy,
    Motivation,
    Execution,
}

impl Axis {
    pub const ALL: [Axis; 4] = [
        Axis::Philosophy,
        Axis::Strategy,
        Axis::Motivation,
        Axis::Execution,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Philosophy => "philosophy",
            Axis::Strategy => "strategy",
            Axis::Motivation => "motivation",
            Axis::Execution => "execution",
        }
    }
}

impl EvaluationRecord {
    pub fn axis(&self, axis: Axis) -> (Option<&str>, Option<f64>, Option<&str>) {
        match axis {
            Axis::Philosophy => (
                self.philosophy_rank.as_deref(),
                self.philosophy_score,
                self.philosophy_reason.as_deref(),
            ),
            Axis::Strategy => (
                self.strategy_rank.as_deref(),
                self.strategy_score,
                self.strategy_reason.as_deref(),
            ),
            Axis::Motivation => (
                self.motivation_rank.as_deref(),
                self.motivation_score,
                self.motivation_reason.as_deref(),
            ),
            Axis::Execution => (
                self.execution_rank.as_deref(),
                self.execution_score,
                self.execution_reason.as_deref(),
            ),
        }
    }

    pub fn next_questions(&self) -> Vec<String> {
        [
            &self.next_question_1,
            &self.next_question_2,
            &self.next_question_3,
            &self.next_question_4,
            &self.next_question_5,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

impl RowSchema for EvaluationRecord {
    const TABLE: &'static str = EVALUATION_MASTER;

    /// `evaluation_id` and `created_at` are assigned by the writer.
    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            (
                "interview_datetime",
                Cell::from_opt_timestamp_text(self.interview_datetime.as_deref()),
            ),
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            ("candidate_name", text(&self.candidate_name)),
            ("recruit_type", text(&self.recruit_type)),
            ("selection_phase", text(&self.selection_phase)),
            ("philosophy_rank", text(&self.philosophy_rank)),
            ("philosophy_score", number(self.philosophy_score)),
            ("philosophy_reason", text(&self.philosophy_reason)),
            ("strategy_rank", text(&self.strategy_rank)),
            ("strategy_score", number(self.strategy_score)),
            ("strategy_reason", text(&self.strategy_reason)),
            ("motivation_rank", text(&self.motivation_rank)),
            ("motivation_score", number(self.motivation_score)),
            ("motivation_reason", text(&self.motivation_reason)),
            ("execution_rank", text(&self.execution_rank)),
            ("execution_score", number(self.execution_score)),
            ("execution_reason", text(&self.execution_reason)),
            ("total_score", number(self.total_score)),
            ("total_rank", text(&self.total_rank)),
            ("pass_probability", number(self.pass_probability)),
            ("recommendation", text(&self.recommendation)),
            ("summary", text(&self.summary)),
            ("transcript", text(&self.transcript)),
            ("interview_memo", text(&self.interview_memo)),
            ("concerns", text(&self.concerns)),
            ("next_check_points", text(&self.next_check_points)),
            ("next_question_1", text(&self.next_question_1)),
            ("next_question_2", text(&self.next_question_2)),
            ("next_question_3", text(&self.next_question_3)),
            ("next_question_4", text(&self.next_question_4)),
            ("next_question_5", text(&self.next_question_5)),
            ("competitor_analysis", text(&self.competitor_analysis)),
            ("evaluation_report_url", text(&self.evaluation_report_url)),
            ("strategy_report_url", text(&self.strategy_report_url)),
            ("workflow_id", text(&self.workflow_id)),
        ]
    }
}
