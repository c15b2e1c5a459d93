use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use hire_common::records::SurveyResponseRecord;
use hire_common::survey::{
    SendRecorded, SurveyError, SurveySendRequest, record_response, record_send, today_send_count,
};
use hire_metrics::SURVEY_SEND_REJECTED_TOTAL;
use metrics::counter;
use serde::Serialize;
use serde_json::{Value, json};

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct TodaySends {
    pub sent_today: usize,
    pub daily_limit: usize,
    pub remaining: usize,
}

fn rejection_reason(err: &SurveyError) -> Option<&'static str> {
    match err {
        SurveyError::DailyLimitReached { .. } => Some("daily_limit"),
        SurveyError::AlreadySent { .. } => Some("already_sent"),
        SurveyError::Validation(_) => Some("validation"),
        _ => None,
    }
}

pub async fn record_survey_send(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(request): Json<SurveySendRequest>,
) -> Result<(StatusCode, Json<SendRecorded>), ApiError> {
    match record_send(state.workbook.as_ref(), state.survey_policy, request, Utc::now()).await {
        Ok(recorded) => Ok((StatusCode::CREATED, Json(recorded))),
        Err(err) => {
            if let Some(reason) = rejection_reason(&err) {
                counter!(SURVEY_SEND_REJECTED_TOTAL, "reason" => reason).increment(1);
            }
            Err(err.into())
        }
    }
}

pub async fn record_survey_response(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Json(record): Json<SurveyResponseRecord>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let response_id = record_response(state.workbook.as_ref(), &record, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "response_id": response_id }))))
}

pub async fn sends_today(
    State(state): State<SharedState>,
    _auth: AuthUser,
) -> Result<Json<TodaySends>, ApiError> {
    let sent_today = today_send_count(state.workbook.as_ref(), Utc::now()).await?;
    let daily_limit = state.survey_policy.daily_limit;
    Ok(Json(TodaySends {
        sent_today,
        daily_limit,
        remaining: daily_limit.saturating_sub(sent_today),
    }))
}
