//! Recording of survey send outcomes and responses. Sending itself happens
//! elsewhere; this module only enforces the daily cap and duplicate rule.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::records::{SendStatus, SurveyResponseRecord, SurveySendRecord};
use crate::response_speed::{is_successful_send, latest_event_time};
use crate::schema::SURVEY_SEND_LOG;
use crate::timezone::business_date;
use crate::workbook::{TableSnapshot, Workbook, WorkbookError, cell_at};
use crate::writers::{WriterError, append_survey_response, append_survey_send};

pub const DEFAULT_DAILY_LIMIT: usize = 90;

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("daily send limit reached ({sent_today}/{limit})")]
    DailyLimitReached { sent_today: usize, limit: usize },
    #[error("survey for {phase} already sent to {candidate_id}")]
    AlreadySent { candidate_id: String, phase: String },
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveyPolicy {
    pub daily_limit: usize,
}

impl Default for SurveyPolicy {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveySendRequest {
    #[serde(flatten)]
    pub record: SurveySendRecord,
    /// Skip the already-sent check.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendRecorded {
    pub send_id: String,
    pub send_status: SendStatus,
    pub sent_today: usize,
    pub daily_limit: usize,
}

// count-then-append must not interleave across requests
static SEND_LOG_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn successful_sends_on(snapshot: &TableSnapshot, day: NaiveDate) -> usize {
    let layout = snapshot.layout();
    let Some(time_column) = layout.position("send_time") else {
        return 0;
    };
    let successful = is_successful_send(snapshot);
    snapshot
        .rows
        .iter()
        .filter(|cells| successful(cells))
        .filter_map(|cells| cell_at(cells, time_column).as_timestamp())
        .filter(|at| business_date(*at) == day)
        .count()
}

pub fn is_already_sent(snapshot: &TableSnapshot, candidate_id: &str, phase: &str) -> bool {
    latest_event_time(
        snapshot,
        candidate_id,
        Some(phase),
        "send_time",
        is_successful_send(snapshot),
    )
    .is_some()
}

/// Successful sends on the current business day.
pub async fn today_send_count(workbook: &dyn Workbook, now: DateTime<Utc>) -> Result<usize, WorkbookError> {
    let snapshot = workbook.rows(SURVEY_SEND_LOG).await?;
    Ok(successful_sends_on(&snapshot, business_date(now)))
}

fn require(value: &str, field: &str) -> Result<(), SurveyError> {
    if value.trim().is_empty() {
        return Err(SurveyError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[instrument(skip_all, fields(candidate_id = %request.record.candidate_id, phase = %request.record.phase))]
pub async fn record_send(
    workbook: &dyn Workbook,
    policy: SurveyPolicy,
    request: SurveySendRequest,
    now: DateTime<Utc>,
) -> Result<SendRecorded, SurveyError> {
    let SurveySendRequest { mut record, force } = request;
    require(&record.candidate_id, "candidate_id")?;
    require(&record.phase, "phase")?;

    let _serialized = SEND_LOG_LOCK.lock().await;
    let snapshot = workbook.rows(SURVEY_SEND_LOG).await?;
    let day = business_date(record.send_time.unwrap_or(now));
    let mut sent_today = successful_sends_on(&snapshot, day);

    if record.send_status == SendStatus::Success {
        if !force && is_already_sent(&snapshot, &record.candidate_id, &record.phase) {
            return Err(SurveyError::AlreadySent {
                candidate_id: record.candidate_id,
                phase: record.phase,
            });
        }

        if sent_today >= policy.daily_limit {
            let err = SurveyError::DailyLimitReached {
                sent_today,
                limit: policy.daily_limit,
            };
            warn!(sent_today, limit = policy.daily_limit, "survey send over daily limit");
            record.send_status = SendStatus::Failure;
            record.error_message = Some(err.to_string());
            append_survey_send(workbook, &record, now).await?;
            return Err(err);
        }
        sent_today += 1;
    }

    let send_id = append_survey_send(workbook, &record, now).await?;
    info!(%send_id, status = record.send_status.as_ref(), sent_today, "survey send recorded");

    Ok(SendRecorded {
        send_id,
        send_status: record.send_status,
        sent_today,
        daily_limit: policy.daily_limit,
    })
}

#[instrument(skip_all, fields(candidate_id = %record.candidate_id, phase = %record.phase))]
pub async fn record_response(
    workbook: &dyn Workbook,
    record: &SurveyResponseRecord,
    now: DateTime<Utc>,
) -> Result<String, SurveyError> {
    require(&record.candidate_id, "candidate_id")?;
    require(&record.phase, "phase")?;
    if let Some(aspiration) = record.aspiration {
        if !(1.0..=10.0).contains(&aspiration) {
            return Err(SurveyError::Validation(format!(
                "aspiration must be between 1 and 10, got {aspiration}"
            )));
        }
    }

    Ok(append_survey_response(workbook, record, now).await?)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::schema::{SURVEY_RESPONSE, bootstrap_workbook};
    use crate::workbook::MemoryWorkbook;

    // 2024-06-01 09:00 JST
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    async fn workbook() -> MemoryWorkbook {
        let wb = MemoryWorkbook::new();
        bootstrap_workbook(&wb).await.unwrap();
        wb
    }

    fn send_request(candidate_id: &str, phase: &str) -> SurveySendRequest {
        SurveySendRequest {
            record: SurveySendRecord {
                candidate_id: candidate_id.into(),
                phase: phase.into(),
                ..Default::default()
            },
            force: false,
        }
    }

    #[tokio::test]
    async fn duplicate_send_is_refused_unless_forced() {
        let wb = workbook().await;
        let policy = SurveyPolicy::default();
        record_send(&wb, policy, send_request("C-1", "初回面談"), now()).await.unwrap();

        let err = record_send(&wb, policy, send_request("C-1", "初回面談"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::AlreadySent { .. }));
        assert_eq!(wb.rows(SURVEY_SEND_LOG).await.unwrap().len(), 1);

        let mut forced = send_request("C-1", "初回面談");
        forced.force = true;
        let recorded = record_send(&wb, policy, forced, now()).await.unwrap();
        assert_eq!(recorded.sent_today, 2);
    }

    #[tokio::test]
    async fn daily_limit_records_a_failure_row() {
        let wb = workbook().await;
        let policy = SurveyPolicy { daily_limit: 2 };
        record_send(&wb, policy, send_request("C-1", "初回面談"), now()).await.unwrap();
        record_send(&wb, policy, send_request("C-2", "初回面談"), now()).await.unwrap();

        let err = record_send(&wb, policy, send_request("C-3", "初回面談"), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::DailyLimitReached { sent_today: 2, limit: 2 }));

        let snapshot = wb.rows(SURVEY_SEND_LOG).await.unwrap();
        assert_eq!(snapshot.len(), 3);
        let last = snapshot.row(3).unwrap();
        assert_eq!(snapshot.layout().get(last, "send_status").display(), "failure");
        assert_eq!(today_send_count(&wb, now()).await.unwrap(), 2);

        // next Tokyo day resets the count
        let tomorrow = now() + Duration::days(1);
        assert_eq!(today_send_count(&wb, tomorrow).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failures_are_recorded_without_counting() {
        let wb = workbook().await;
        let mut request = send_request("C-1", "初回面談");
        request.record.send_status = SendStatus::Failure;
        request.record.error_message = Some("bounce".into());
        let recorded = record_send(&wb, SurveyPolicy::default(), request, now()).await.unwrap();
        assert_eq!(recorded.sent_today, 0);
        assert_eq!(today_send_count(&wb, now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn response_validation() {
        let wb = workbook().await;
        let mut response = SurveyResponseRecord {
            candidate_id: "C-1".into(),
            phase: "初回面談".into(),
            aspiration: Some(11.0),
            ..Default::default()
        };
        assert!(matches!(
            record_response(&wb, &response, now()).await,
            Err(SurveyError::Validation(_))
        ));

        response.aspiration = Some(7.0);
        let id = record_response(&wb, &response, now()).await.unwrap();
        assert!(id.starts_with("RESP_"));
        assert_eq!(wb.rows(SURVEY_RESPONSE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_phase_is_rejected_before_writing() {
        let wb = workbook().await;
        let err = record_send(&wb, SurveyPolicy::default(), send_request("C-1", " "), now())
            .await
            .unwrap_err();
        assert!(matches!(err, SurveyError::Validation(_)));
        assert!(wb.rows(SURVEY_SEND_LOG).await.unwrap().is_empty());
    }
}
