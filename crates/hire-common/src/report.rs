//! Client for the external document generator that renders evaluation and
//! strategy reports.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::records::{EngagementRecord, EvaluationRecord, evaluation::Axis};
use crate::timezone::BUSINESS_TIMEZONE;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NO_TRANSCRIPT: &str = "（文字起こしデータなし）";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report generator is not configured")]
    Disabled,
    #[error("report request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("report generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("report generator returned no url")]
    MissingUrl,
}

/// 総合ランク → 推奨度。
pub fn recommendation(rank: Option<&str>) -> &'static str {
    match rank.map(str::trim) {
        Some("A") => "積極採用推奨",
        Some("B") => "採用推奨",
        Some("C") => "条件付き採用検討",
        Some("D") => "慎重検討",
        Some("E") => "見送り推奨",
        _ => "要検討",
    }
}

pub fn axis_summary(axis: Axis, rank: Option<&str>) -> &'static str {
    let Some(rank) = rank.map(str::trim) else {
        return "評価保留";
    };
    match (axis, rank) {
        (Axis::Philosophy, "A") => "理念への深い共感が見られる",
        (Axis::Philosophy, "B") => "理念への一定の共感が見られる",
        (Axis::Philosophy, "C") => "理念理解は標準的",
        (Axis::Philosophy, "D") => "理念への共感がやや弱い",
        (Axis::Philosophy, "E") => "理念とのミスマッチが懸念される",
        (Axis::Strategy, "A") => "優れた戦略的思考力",
        (Axis::Strategy, "B") => "戦略理解は十分、実践経験で向上可",
        (Axis::Strategy, "C") => "戦略理解は標準的",
        (Axis::Strategy, "D") => "戦略的思考力の強化が必要",
        (Axis::Strategy, "E") => "戦略的思考力に大きな課題",
        (Axis::Motivation, "A") => "非常に高い志望度、成長意欲強",
        (Axis::Motivation, "B") => "高い志望度が見られる",
        (Axis::Motivation, "C") => "志望度は標準的",
        (Axis::Motivation, "D") => "志望度がやや低い",
        (Axis::Motivation, "E") => "志望度が低い、動機に懸念",
        (Axis::Execution, "A") => "優れた実行力、実績あり",
        (Axis::Execution, "B") => "実行力は十分、実績あり",
        (Axis::Execution, "C") => "実行力は標準的",
        (Axis::Execution, "D") => "実行力の強化が必要",
        (Axis::Execution, "E") => "実行力に大きな課題",
        _ => "評価保留",
    }
}

/// Who and what a report is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportContext {
    pub candidate_id: String,
    pub candidate_name: String,
    pub interviewer: Option<String>,
    pub selection_phase: String,
    pub recruit_type: String,
    pub company_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSection {
    pub axis: &'static str,
    pub rank: Option<String>,
    pub score: Option<f64>,
    pub summary: &'static str,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReportRequest {
    #[serde(flatten)]
    pub context: ReportContext,
    pub interview_date: String,
    pub total_rank: Option<String>,
    pub recommendation: &'static str,
    pub summary_reasons: Vec<&'static str>,
    pub axes: Vec<AxisSection>,
    pub next_questions: Vec<String>,
    pub interviewer_comment: String,
    pub transcript: String,
}

impl EvaluationReportRequest {
    pub fn build(context: ReportContext, evaluation: &EvaluationRecord, now: DateTime<Utc>) -> Self {
        let interview_date = evaluation.interview_datetime.clone().unwrap_or_else(|| {
            now.with_timezone(&BUSINESS_TIMEZONE)
                .format("%Y/%m/%d")
                .to_string()
        });

        let summary_reasons = [
            (evaluation.philosophy_reason.is_some(), "理念への共感が見られる"),
            (evaluation.strategy_reason.is_some(), "戦略的思考力がある"),
            (evaluation.motivation_reason.is_some(), "高い志望度が見られる"),
        ]
        .into_iter()
        .filter_map(|(present, reason)| present.then_some(reason))
        .collect();

        let axes = Axis::ALL
            .into_iter()
            .map(|axis| {
                let (rank, score, reason) = evaluation.axis(axis);
                AxisSection {
                    axis: axis.as_str(),
                    rank: rank.map(str::to_string),
                    score,
                    summary: axis_summary(axis, rank),
                    reason: reason.map(str::to_string),
                }
            })
            .collect();

        Self {
            context,
            interview_date,
            total_rank: evaluation.total_rank.clone(),
            recommendation: recommendation(evaluation.total_rank.as_deref()),
            summary_reasons,
            axes,
            next_questions: evaluation.next_questions(),
            interviewer_comment: evaluation.summary.clone().unwrap_or_default(),
            transcript: evaluation
                .transcript
                .clone()
                .unwrap_or_else(|| NO_TRANSCRIPT.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReportRequest {
    #[serde(flatten)]
    pub context: ReportContext,
    pub acceptance_probability: f64,
    pub confidence_level: String,
    pub immediate_action_24h: String,
    pub risk_factors: Vec<String>,
    pub our_strengths: Vec<String>,
    pub acceptance_story: Vec<String>,
    pub competitors: Option<serde_json::Value>,
}

impl StrategyReportRequest {
    pub fn build(context: ReportContext, engagement: &EngagementRecord) -> Self {
        Self {
            context,
            acceptance_probability: engagement.acceptance_rate_ai.unwrap_or(0.0),
            confidence_level: engagement
                .confidence_level
                .clone()
                .unwrap_or_else(|| "MEDIUM".to_string()),
            immediate_action_24h: engagement
                .next_action
                .clone()
                .unwrap_or_else(|| "（アクションなし）".to_string()),
            risk_factors: engagement.key_risk_factors.clone(),
            our_strengths: engagement.key_positive_factors.clone(),
            acceptance_story: engagement.acceptance_story(),
            competitors: engagement.competitors.clone(),
        }
    }
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn evaluation_report(&self, request: &EvaluationReportRequest) -> Result<String, ReportError>;

    async fn strategy_report(&self, request: &StrategyReportRequest) -> Result<String, ReportError>;
}

/// Used when no generator endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledReportGenerator;

#[async_trait]
impl ReportGenerator for DisabledReportGenerator {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn evaluation_report(&self, _request: &EvaluationReportRequest) -> Result<String, ReportError> {
        Err(ReportError::Disabled)
    }

    async fn strategy_report(&self, _request: &StrategyReportRequest) -> Result<String, ReportError> {
        Err(ReportError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedDocument {
    url: Option<String>,
}

/// POSTs report requests as JSON to `{endpoint}/evaluation` and
/// `{endpoint}/strategy`; the reply carries the document `url`.
#[derive(Debug, Clone)]
pub struct HttpReportGenerator {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpReportGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("hire-common/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        }
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<String, ReportError> {
        let url = format!("{}/{path}", self.endpoint);
        debug!(%url, "requesting report");

        let mut request = self.http_client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let document: GeneratedDocument = response.json().await?;
        document
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ReportError::MissingUrl)
    }
}

#[async_trait]
impl ReportGenerator for HttpReportGenerator {
    fn is_enabled(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(candidate_id = %request.context.candidate_id))]
    async fn evaluation_report(&self, request: &EvaluationReportRequest) -> Result<String, ReportError> {
        self.post("evaluation", request).await
    }

    #[instrument(skip_all, fields(candidate_id = %request.context.candidate_id))]
    async fn strategy_report(&self, request: &StrategyReportRequest) -> Result<String, ReportError> {
        self.post("strategy", request).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::records::EngagementStrategy;

    #[test]
    fn recommendation_follows_rank() {
        assert_eq!(recommendation(Some("A")), "積極採用推奨");
        assert_eq!(recommendation(Some("E")), "見送り推奨");
        assert_eq!(recommendation(Some("S")), "要検討");
        assert_eq!(recommendation(None), "要検討");
    }

    #[test]
    fn axis_summary_falls_back_to_pending() {
        assert_eq!(axis_summary(Axis::Strategy, Some("B")), "戦略理解は十分、実践経験で向上可");
        assert_eq!(axis_summary(Axis::Execution, Some("Z")), "評価保留");
        assert_eq!(axis_summary(Axis::Philosophy, None), "評価保留");
    }

    #[test]
    fn evaluation_request_collects_axes_and_questions() {
        let evaluation = EvaluationRecord {
            candidate_id: "C-1".into(),
            total_rank: Some("B".into()),
            philosophy_rank: Some("A".into()),
            philosophy_reason: Some("共感".into()),
            next_question_1: Some("Q1".into()),
            next_question_3: Some("Q3".into()),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 16, 0, 0).unwrap();
        let request = EvaluationReportRequest::build(ReportContext::default(), &evaluation, now);

        assert_eq!(request.recommendation, "採用推奨");
        assert_eq!(request.summary_reasons, vec!["理念への共感が見られる"]);
        assert_eq!(request.axes.len(), 4);
        assert_eq!(request.axes[0].summary, "理念への深い共感が見られる");
        assert_eq!(request.next_questions, vec!["Q1".to_string(), "Q3".to_string()]);
        assert_eq!(request.transcript, NO_TRANSCRIPT);
        // 16:00 UTC is already the next day in Tokyo
        assert_eq!(request.interview_date, "2024/06/02");
    }

    #[test]
    fn strategy_request_defaults() {
        let engagement = EngagementRecord {
            key_risk_factors: vec!["競合".into()],
            engagement_strategy: Some(EngagementStrategy {
                immediate_action_24h: Some("連絡".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let request = StrategyReportRequest::build(ReportContext::default(), &engagement);
        assert_eq!(request.acceptance_probability, 0.0);
        assert_eq!(request.confidence_level, "MEDIUM");
        assert_eq!(request.acceptance_story, vec!["Step 1: 連絡".to_string()]);
        assert_eq!(request.risk_factors, vec!["競合".to_string()]);
    }

    #[tokio::test]
    async fn disabled_generator_refuses() {
        let generator = DisabledReportGenerator;
        assert!(!generator.is_enabled());
        let request = StrategyReportRequest::build(ReportContext::default(), &EngagementRecord::default());
        assert!(matches!(
            generator.strategy_report(&request).await,
            Err(ReportError::Disabled)
        ));
    }
}
