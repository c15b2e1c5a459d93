//! Candidate behavior report built from survey sends and responses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::response_speed::{is_successful_send, latest_event_time};
use crate::schema::{CANDIDATE_ID, SURVEY_RESPONSE, SURVEY_SEND_LOG};
use crate::workbook::{Workbook, WorkbookError, cell_at};

pub const NO_DATA_SUMMARY: &str = "データなし";

/// 0–100: response rate contributes up to 50, speed tier up to 30, activity up to 20.
pub fn behavior_engagement_score(response_rate: f64, avg_response_hours: f64, survey_count: usize) -> f64 {
    let mut score = response_rate * 0.5;

    if avg_response_hours > 0.0 {
        score += if avg_response_hours <= 24.0 {
            30.0
        } else if avg_response_hours <= 48.0 {
            20.0
        } else if avg_response_hours <= 72.0 {
            10.0
        } else {
            0.0
        };
    }

    score += match survey_count {
        n if n >= 5 => 20.0,
        n if n >= 3 => 15.0,
        n if n >= 1 => 10.0,
        _ => 0.0,
    };
    score
}

pub fn behavior_summary(response_rate: f64, avg_response_hours: f64, survey_count: usize) -> String {
    let mut phrases = Vec::with_capacity(3);

    phrases.push(if response_rate >= 80.0 {
        "非常に高い回答率"
    } else if response_rate >= 50.0 {
        "良好な回答率"
    } else if response_rate >= 30.0 {
        "やや低い回答率"
    } else {
        "低い回答率"
    });

    if avg_response_hours > 0.0 {
        phrases.push(if avg_response_hours <= 24.0 {
            "迅速な回答"
        } else if avg_response_hours <= 48.0 {
            "適度な回答速度"
        } else {
            "回答に時間がかかる傾向"
        });
    }

    phrases.push(if survey_count >= 5 {
        "高いエンゲージメント"
    } else if survey_count >= 3 {
        "適度なエンゲージメント"
    } else {
        "限定的なエンゲージメント"
    });

    phrases.join("、")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorReport {
    pub candidate_id: String,
    pub survey_count: usize,
    pub response_count: usize,
    pub response_rate: f64,
    pub avg_response_time_hours: f64,
    pub engagement_score: u32,
    pub last_survey_date: Option<DateTime<Utc>>,
    pub has_data: bool,
    pub behavior_summary: String,
}

impl BehaviorReport {
    pub fn empty(candidate_id: &str) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            survey_count: 0,
            response_count: 0,
            response_rate: 0.0,
            avg_response_time_hours: 0.0,
            engagement_score: 0,
            last_survey_date: None,
            has_data: false,
            behavior_summary: NO_DATA_SUMMARY.to_string(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[instrument(skip(workbook))]
pub async fn behavior_report(
    workbook: &dyn Workbook,
    candidate_id: &str,
) -> Result<BehaviorReport, WorkbookError> {
    let sends = workbook.rows(SURVEY_SEND_LOG).await?;
    let layout = sends.layout();
    let (Some(key_column), Some(phase_column)) = (layout.position(CANDIDATE_ID), layout.position("phase"))
    else {
        return Ok(BehaviorReport::empty(candidate_id));
    };
    let successful = is_successful_send(&sends);
    let send_time_column = layout.position("send_time");

    let mut survey_count = 0;
    let mut last_survey_date: Option<DateTime<Utc>> = None;
    let mut send_phases: Vec<String> = Vec::new();
    for (_, cells) in sends.rows_with_key(key_column, candidate_id) {
        if !successful(cells) {
            continue;
        }
        survey_count += 1;
        send_phases.push(cell_at(cells, phase_column).display().trim().to_string());
        if let Some(at) = send_time_column.and_then(|column| cell_at(cells, column).as_timestamp()) {
            last_survey_date = Some(last_survey_date.map_or(at, |prev| prev.max(at)));
        }
    }

    if survey_count == 0 {
        return Ok(BehaviorReport::empty(candidate_id));
    }

    let responses = workbook.rows(SURVEY_RESPONSE).await?;
    let responded_phases: BTreeSet<String> = match (responses.column(CANDIDATE_ID), responses.column("phase")) {
        (Some(key), Some(phase)) => responses
            .rows_with_key(key, candidate_id)
            .map(|(_, cells)| cell_at(cells, phase).display().trim().to_string())
            .collect(),
        _ => BTreeSet::new(),
    };

    let response_count = send_phases
        .iter()
        .filter(|phase| responded_phases.contains(phase.as_str()))
        .count();

    let unique_phases: BTreeSet<&str> = send_phases.iter().map(String::as_str).collect();
    let latencies: Vec<f64> = unique_phases
        .into_iter()
        .filter(|phase| responded_phases.contains(*phase))
        .filter_map(|phase| {
            let sent = latest_event_time(&sends, candidate_id, Some(phase), "send_time", is_successful_send(&sends))?;
            let answered = latest_event_time(&responses, candidate_id, Some(phase), "response_time", |_| true)?;
            let hours = (answered - sent).num_milliseconds() as f64 / 3_600_000.0;
            (hours >= 0.0).then_some(hours)
        })
        .collect();

    let response_rate = response_count as f64 / survey_count as f64 * 100.0;
    let avg_hours = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };
    let score = behavior_engagement_score(response_rate, avg_hours, survey_count);

    Ok(BehaviorReport {
        candidate_id: candidate_id.to_string(),
        survey_count,
        response_count,
        response_rate: round1(response_rate),
        avg_response_time_hours: round1(avg_hours),
        engagement_score: score.round() as u32,
        last_survey_date,
        has_data: true,
        behavior_summary: behavior_summary(response_rate, avg_hours, survey_count),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::records::{SendStatus, SurveyResponseRecord, SurveySendRecord};
    use crate::schema::bootstrap_workbook;
    use crate::workbook::MemoryWorkbook;
    use crate::writers::{append_survey_response, append_survey_send};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    async fn send(wb: &MemoryWorkbook, phase: &str, at: DateTime<Utc>, status: SendStatus) {
        let record = SurveySendRecord {
            candidate_id: "C-1".into(),
            phase: phase.into(),
            send_time: Some(at),
            send_status: status,
            ..Default::default()
        };
        append_survey_send(wb, &record, at).await.unwrap();
    }

    async fn respond(wb: &MemoryWorkbook, phase: &str, at: DateTime<Utc>) {
        let record = SurveyResponseRecord {
            candidate_id: "C-1".into(),
            phase: phase.into(),
            response_time: Some(at),
            aspiration: Some(8.0),
            ..Default::default()
        };
        append_survey_response(wb, &record, at).await.unwrap();
    }

    #[test]
    fn score_components_add_up() {
        assert_eq!(behavior_engagement_score(100.0, 10.0, 5), 100.0);
        assert_eq!(behavior_engagement_score(50.0, 30.0, 3), 25.0 + 20.0 + 15.0);
        assert_eq!(behavior_engagement_score(0.0, 0.0, 1), 10.0);
        assert_eq!(behavior_engagement_score(0.0, 100.0, 0), 0.0);
    }

    #[test]
    fn summary_phrases() {
        assert_eq!(
            behavior_summary(100.0, 5.0, 5),
            "非常に高い回答率、迅速な回答、高いエンゲージメント"
        );
        assert_eq!(behavior_summary(40.0, 0.0, 1), "やや低い回答率、限定的なエンゲージメント");
    }

    #[tokio::test]
    async fn no_sends_means_no_data() {
        let wb = MemoryWorkbook::new();
        bootstrap_workbook(&wb).await.unwrap();
        let report = behavior_report(&wb, "C-1").await.unwrap();
        assert!(!report.has_data);
        assert_eq!(report.behavior_summary, NO_DATA_SUMMARY);
        assert_eq!(report.last_survey_date, None);
    }

    #[tokio::test]
    async fn aggregates_sends_and_responses() {
        let wb = MemoryWorkbook::new();
        bootstrap_workbook(&wb).await.unwrap();

        send(&wb, "初回面談", t0(), SendStatus::Success).await;
        respond(&wb, "初回面談", t0() + Duration::hours(10)).await;
        send(&wb, "二次面接", t0() + Duration::days(3), SendStatus::Success).await;
        respond(&wb, "二次面接", t0() + Duration::days(3) + Duration::hours(20)).await;
        send(&wb, "最終面接", t0() + Duration::days(6), SendStatus::Success).await;
        send(&wb, "最終面接", t0() + Duration::days(7), SendStatus::Failure).await;

        let report = behavior_report(&wb, "C-1").await.unwrap();
        assert!(report.has_data);
        assert_eq!(report.survey_count, 3);
        assert_eq!(report.response_count, 2);
        assert_eq!(report.response_rate, 66.7);
        assert_eq!(report.avg_response_time_hours, 15.0);
        // 33.33 + 30 + 15
        assert_eq!(report.engagement_score, 78);
        assert_eq!(report.last_survey_date, Some(t0() + Duration::days(6)));
        assert_eq!(report.behavior_summary, "良好な回答率、迅速な回答、適度なエンゲージメント");
    }

    #[tokio::test]
    async fn response_before_send_is_left_out_of_the_average() {
        let wb = MemoryWorkbook::new();
        bootstrap_workbook(&wb).await.unwrap();
        send(&wb, "初回面談", t0() + Duration::hours(5), SendStatus::Success).await;
        respond(&wb, "初回面談", t0()).await;

        let report = behavior_report(&wb, "C-1").await.unwrap();
        assert_eq!(report.response_count, 1);
        assert_eq!(report.avg_response_time_hours, 0.0);
    }
}
