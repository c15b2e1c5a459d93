//! Survey response latency and its 0–100 speed score.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::records::SendStatus;
use crate::schema::{CANDIDATE_ID, SURVEY_RESPONSE, SURVEY_SEND_LOG};
use crate::workbook::{Cell, TableSnapshot, Workbook, WorkbookError, cell_at};

/// 回答速度スコア。Piecewise-linear in hours, non-increasing, clamped to 0.
pub fn response_speed_score(hours: f64) -> f64 {
    if hours < 0.0 || hours.is_nan() {
        return 0.0;
    }
    if hours <= 2.0 {
        100.0
    } else if hours <= 6.0 {
        100.0 - (hours - 2.0) / 4.0 * 20.0
    } else if hours <= 24.0 {
        80.0 - (hours - 6.0) / 18.0 * 30.0
    } else if hours <= 48.0 {
        50.0 - (hours - 24.0) / 24.0 * 30.0
    } else {
        (20.0 - (hours - 48.0) / 24.0 * 5.0).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSpeed {
    pub candidate_id: String,
    pub phase: String,
    pub send_time: DateTime<Utc>,
    pub response_time: DateTime<Utc>,
    pub response_time_hours: f64,
    pub response_speed_score: u32,
}

/// Latency between a send and its response. Hours keep one decimal and the
/// score rounds half up.
pub fn measure(send_time: DateTime<Utc>, response_time: DateTime<Utc>) -> (f64, u32) {
    let hours = (response_time - send_time).num_milliseconds() as f64 / 3_600_000.0;
    let score = response_speed_score(hours);
    ((hours * 10.0).round() / 10.0, (score + 0.5).floor() as u32)
}

/// Latest time in `time_header` among rows for the candidate and phase that
/// also pass `keep`.
pub(crate) fn latest_event_time(
    snapshot: &TableSnapshot,
    candidate_id: &str,
    phase: Option<&str>,
    time_header: &str,
    keep: impl Fn(&[Cell]) -> bool,
) -> Option<DateTime<Utc>> {
    let layout = snapshot.layout();
    let key_column = layout.position(CANDIDATE_ID)?;
    let time_column = layout.position(time_header)?;
    let phase_column = layout.position("phase");

    snapshot
        .rows_with_key(key_column, candidate_id)
        .filter(|(_, cells)| match (phase, phase_column) {
            (Some(phase), Some(column)) => cell_at(cells, column).matches_key(phase),
            (Some(_), None) => false,
            (None, _) => true,
        })
        .filter(|(_, cells)| keep(cells))
        .filter_map(|(_, cells)| cell_at(cells, time_column).as_timestamp())
        .max()
}

pub(crate) fn is_successful_send(snapshot: &TableSnapshot) -> impl Fn(&[Cell]) -> bool + use<> {
    let status_column = snapshot.column("send_status");
    move |cells| {
        status_column.is_some_and(|column| {
            SendStatus::from_cell(cell_at(cells, column)) == SendStatus::Success
        })
    }
}

/// `None` when either the successful send or the response is missing.
#[instrument(skip(workbook))]
pub async fn analyze_response_speed(
    workbook: &dyn Workbook,
    candidate_id: &str,
    phase: &str,
) -> Result<Option<ResponseSpeed>, WorkbookError> {
    let sends = workbook.rows(SURVEY_SEND_LOG).await?;
    let Some(send_time) =
        latest_event_time(&sends, candidate_id, Some(phase), "send_time", is_successful_send(&sends))
    else {
        debug!("no successful send");
        return Ok(None);
    };

    let responses = workbook.rows(SURVEY_RESPONSE).await?;
    let Some(response_time) =
        latest_event_time(&responses, candidate_id, Some(phase), "response_time", |_| true)
    else {
        debug!("no response");
        return Ok(None);
    };

    let (hours, score) = measure(send_time, response_time);
    Ok(Some(ResponseSpeed {
        candidate_id: candidate_id.to_string(),
        phase: phase.to_string(),
        send_time,
        response_time,
        response_time_hours: hours,
        response_speed_score: score,
    }))
}
