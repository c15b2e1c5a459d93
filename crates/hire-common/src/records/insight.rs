use serde::Deserialize;

use super::{Keyed, RowSchema, lenient, preferred_name, text};
use crate::schema::{CANDIDATE_ID, CANDIDATE_INSIGHTS};
use crate::workbook::Cell;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InsightRecord {
    #[serde(deserialize_with = "lenient::string")]
    pub candidate_id: String,
    #[serde(rename = "氏名", deserialize_with = "lenient::opt_string")]
    pub registered_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub candidate_name: Option<String>,
    #[serde(alias = "コアモチベーション", deserialize_with = "lenient::opt_string")]
    pub core_motivation: Option<String>,
    #[serde(alias = "主要懸念事項", deserialize_with = "lenient::opt_string")]
    pub top_concern: Option<String>,
    #[serde(alias = "競合企業1", deserialize_with = "lenient::opt_string")]
    pub competitor_1: Option<String>,
    #[serde(alias = "競合企業2", deserialize_with = "lenient::opt_string")]
    pub competitor_2: Option<String>,
    #[serde(alias = "競合企業3", deserialize_with = "lenient::opt_string")]
    pub competitor_3: Option<String>,
    #[serde(alias = "次推奨アクション", deserialize_with = "lenient::opt_string")]
    pub next_action: Option<String>,
}

impl RowSchema for InsightRecord {
    const TABLE: &'static str = CANDIDATE_INSIGHTS;

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
            ("core_motivation", text(&self.core_motivation)),
            ("top_concern", text(&self.top_concern)),
            ("competitor_1", text(&self.competitor_1)),
            ("competitor_2", text(&self.competitor_2)),
            ("competitor_3", text(&self.competitor_3)),
            ("next_action", text(&self.next_action)),
        ]
    }
}

impl Keyed for InsightRecord {
    const KEY: &'static str = CANDIDATE_ID;

    fn key(&self) -> &str {
        self.candidate_id.trim()
    }
}
