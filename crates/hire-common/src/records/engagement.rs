use serde::Deserialize;
use serde_json::Value;

use super::{RowSchema, lenient, number, preferred_name, text};
use crate::schema::ENGAGEMENT_LOG;
use crate::workbook::Cell;

pub const DEFAULT_ACTION_STATUS: &str = "未実施";

/// 24/48/72時間のフォロー施策。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngagementStrategy {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub immediate_action_24h: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub followup_action_48h: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub longterm_action_72h: Option<String>,
}

/// `engagement_log` section. Besides the logged columns it carries the risk
/// and strategy material consumed by the strategy report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngagementRecord {
    #[serde(deserialize_with = "lenient::opt_string")]
    pub log_id: Option<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(rename = "氏名", deserialize_with = "lenient::opt_string")]
    pub registered_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub contact_type: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub acceptance_rate_rule: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub acceptance_rate_ai: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub acceptance_rate_final: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub confidence_level: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub motivation_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub competitive_advantage_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub concern_resolution_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub core_motivation: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub top_concern: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub concern_category: Option<String>,
    pub competitors: Option<Value>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub competitive_advantage: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub next_action: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub action_deadline: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub action_priority: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub action_status: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub key_risk_factors: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub key_positive_factors: Vec<String>,
    pub engagement_strategy: Option<EngagementStrategy>,
}

/// HIGH/MEDIUM/LOW → 高/中/低. Anything else is shown as given.
pub fn confidence_display(code: &str) -> String {
    match code.trim().to_ascii_uppercase().as_str() {
        "HIGH" => "高".to_string(),
        "MEDIUM" => "中".to_string(),
        "LOW" => "低".to_string(),
        _ => code.trim().to_string(),
    }
}

/// `65.0` → `"65%"`, `65.25` → `"65.3%"`.
pub fn percent_text(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}%", rounded as i64)
    } else {
        format!("{rounded:.1}%")
    }
}

fn percent_cell(value: Option<f64>) -> Cell {
    value.map(|v| Cell::Text(percent_text(v))).unwrap_or_default()
}

fn competitors_cell(value: &Option<Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Empty,
        Some(Value::String(text)) => Cell::from_opt_str(Some(text)),
        Some(Value::Array(items)) if items.is_empty() => Cell::Empty,
        Some(other) => Cell::Text(other.to_string()),
    }
}

impl EngagementRecord {
    pub fn action_status_or_default(&self) -> &str {
        self.action_status.as_deref().unwrap_or(DEFAULT_ACTION_STATUS)
    }

    /// Story steps for the strategy report, skipping steps the workflow left blank.
    pub fn acceptance_story(&self) -> Vec<String> {
        let Some(strategy) = &self.engagement_strategy else {
            return Vec::new();
        };
        [
            &strategy.immediate_action_24h,
            &strategy.followup_action_48h,
            &strategy.longterm_action_72h,
        ]
        .into_iter()
        .enumerate()
        .filter_map(|(idx, step)| step.as_ref().map(|s| format!("Step {}: {s}", idx + 1)))
        .collect()
    }
}

impl RowSchema for EngagementRecord {
    const TABLE: &'static str = ENGAGEMENT_LOG;

    /// `log_id` and `timestamp` are filled by the writer when absent.
    fn cells(&self) -> Vec<(&'static str, Cell)> {
        vec![
            ("log_id", text(&self.log_id)),
            ("candidate_id", Cell::text(self.candidate_id.trim())),
            (
                "candidate_name",
                Cell::from_opt_str(preferred_name(&[&self.registered_name, &self.candidate_name])),
            ),
            ("timestamp", Cell::from_opt_timestamp_text(self.timestamp.as_deref())),
            ("contact_type", text(&self.contact_type)),
            ("acceptance_rate_rule", percent_cell(self.acceptance_rate_rule)),
            ("acceptance_rate_ai", percent_cell(self.acceptance_rate_ai)),
            ("acceptance_rate_final", percent_cell(self.acceptance_rate_final)),
            (
                "confidence_level",
                Cell::from_opt_str(self.confidence_level.as_deref().map(confidence_display).as_deref()),
            ),
            ("motivation_score", number(self.motivation_score)),
            ("competitive_advantage_score", number(self.competitive_advantage_score)),
            ("concern_resolution_score", number(self.concern_resolution_score)),
            ("core_motivation", text(&self.core_motivation)),
            ("top_concern", text(&self.top_concern)),
            ("concern_category", text(&self.concern_category)),
            ("competitors", competitors_cell(&self.competitors)),
            ("competitive_advantage", text(&self.competitive_advantage)),
            ("next_action", text(&self.next_action)),
            ("action_deadline", text(&self.action_deadline)),
            ("action_priority", text(&self.action_priority)),
            ("action_status", Cell::text(self.action_status_or_default())),
            ("notes", text(&self.notes)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn confidence_codes_map_to_display_labels() {
        assert_eq!(confidence_display("HIGH"), "高");
        assert_eq!(confidence_display("medium"), "中");
        assert_eq!(confidence_display("LOW"), "低");
        assert_eq!(confidence_display("不明"), "不明");
    }

    #[test]
    fn percentages_keep_one_decimal_only_when_fractional() {
        assert_eq!(percent_text(65.0), "65%");
        assert_eq!(percent_text(65.25), "65.3%");
        assert_eq!(percent_text(0.0), "0%");
    }

    #[test]
    fn row_applies_display_transforms() {
        let record: EngagementRecord = serde_json::from_value(json!({
            "candidate_id": "C-9",
            "acceptance_rate_ai": 65,
            "confidence_level": "HIGH",
            "competitors": [{"name": "Acme", "probability": 40}]
        }))
        .unwrap();

        let cells: std::collections::HashMap<_, _> = record.cells().into_iter().collect();
        assert_eq!(cells["acceptance_rate_ai"], Cell::text("65%"));
        assert_eq!(cells["confidence_level"], Cell::text("高"));
        assert_eq!(cells["action_status"], Cell::text(DEFAULT_ACTION_STATUS));
        assert_eq!(
            cells["competitors"],
            Cell::text(r#"[{"name":"Acme","probability":40}]"#)
        );
    }

    #[test]
    fn acceptance_story_skips_blank_steps() {
        let record = EngagementRecord {
            engagement_strategy: Some(EngagementStrategy {
                immediate_action_24h: Some("お礼の連絡".into()),
                followup_action_48h: None,
                longterm_action_72h: Some("社員面談".into()),
            }),
            ..Default::default()
        };
        assert_eq!(
            record.acceptance_story(),
            vec!["Step 1: お礼の連絡".to_string(), "Step 3: 社員面談".to_string()]
        );
    }
}
