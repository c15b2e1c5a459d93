use serde::Deserialize;

use super::{RowSchema, lenient, number, preferred_name, text};
use crate::schema::CANDIDATE_SCORES;
use crate::workbook::Cell;

/// `candidate_scores` section, appended as a new snapshot row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoreSnapshotRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(rename = "氏名", deserialize_with = "lenient::opt_string")]
    pub registered_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(alias = "最新_Philosophy", deserialize_with = "lenient::opt_f64")]
    pub latest_philosophy: Option<f64>,
    #[serde(alias = "最新_Strategy", deserialize_with = "lenient::opt_f64")]
    pub latest_strategy: Option<f64>,
    #[serde(alias = "最新_Motivation", deserialize_with = "lenient::opt_f64")]
    pub latest_motivation: Option<f64>,
    #[serde(alias = "最新_Execution", deserialize_with = "lenient::opt_f64")]
    pub latest_execution: Option<f64>,
    #[serde(alias = "最新_合計スコア", deserialize_with = "lenient::opt_f64")]
    pub latest_total_score: Option<f64>,
    #[serde(alias = "最新_承諾可能性（AI予測）", deserialize_with = "lenient::opt_f64")]
    pub latest_acceptance_ai: Option<f64>,
    #[serde(alias = "最新_承諾可能性（統合）", deserialize_with = "lenient::opt_f64")]
    pub latest_acceptance_final: Option<f64>,
    #[serde(alias = "予測の信頼度", deserialize_with = "lenient::opt_string")]
    pub confidence_level: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub motivation_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub competitive_advantage_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub concern_resolution_score: Option<f64>,
}

const AXIS_SUM_TOLERANCE: f64 = 0.01;

impl ScoreSnapshotRecord {
    /// Warning text when all four axis scores and a total are present but
    /// the total is not their sum.
    pub fn axis_sum_warning(&self) -> Option<String> {
        let axes = [
            self.latest_philosophy?,
            self.latest_strategy?,
            self.latest_motivation?,
            self.latest_execution?,
        ];
        let total = self.latest_total_score?;
        let computed: f64 = axes.iter().sum();

        ((computed - total).abs() > AXIS_SUM_TOLERANCE).then(|| {
            format!(
                "candidate_scores total mismatch for {}: axes sum to {computed} but total is {total}",
                self.candidate_id
            )
        })
    }
}

impl RowSchema for ScoreSnapshotRecord {
    const TABLE: &'static str = CANDIDATE_SCORES;

    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            (
                "name",
                Cell::from_opt_str(preferred_name(&[
                    &self.registered_name,
                    &self.name,
                    &self.candidate_name,
                ])),
            ),
            ("latest_philosophy", number(self.latest_philosophy)),
            ("latest_strategy", number(self.latest_strategy)),
            ("latest_motivation", number(self.latest_motivation)),
            ("latest_execution", number(self.latest_execution)),
            ("latest_total_score", number(self.latest_total_score)),
            ("latest_acceptance_ai", number(self.latest_acceptance_ai)),
            ("latest_acceptance_final", number(self.latest_acceptance_final)),
            ("confidence_level", text(&self.confidence_level)),
            ("motivation_score", number(self.motivation_score)),
            ("competitive_advantage_score", number(self.competitive_advantage_score)),
            ("concern_resolution_score", number(self.concern_resolution_score)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flags_total_that_is_not_the_axis_sum() {
        let record: ScoreSnapshotRecord = serde_json::from_value(json!({
            "candidate_id": "C-1",
            "最新_Philosophy": 20,
            "最新_Strategy": 18,
            "最新_Motivation": 22,
            "最新_Execution": 15,
            "最新_合計スコア": 80
        }))
        .unwrap();

        let warning = record.axis_sum_warning().unwrap();
        assert!(warning.contains("75"));
        assert!(warning.contains("80"));
    }

    #[test]
    fn no_warning_when_consistent_or_incomplete() {
        let consistent = ScoreSnapshotRecord {
            latest_philosophy: Some(20.0),
            latest_strategy: Some(20.0),
            latest_motivation: Some(20.0),
            latest_execution: Some(15.0),
            latest_total_score: Some(75.0),
            ..Default::default()
        };
        assert!(consistent.axis_sum_warning().is_none());

        let partial = ScoreSnapshotRecord {
            latest_philosophy: Some(20.0),
            latest_total_score: Some(75.0),
            ..Default::default()
        };
        assert!(partial.axis_sum_warning().is_none());
    }
}
