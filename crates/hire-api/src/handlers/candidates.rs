use axum::{
    Json,
    extract::{Path, Query, State},
};
use hire_common::behavior::{BehaviorReport, behavior_report};
use hire_common::response_speed::{ResponseSpeed, analyze_response_speed};
use serde::Deserialize;

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ResponseSpeedQuery {
    pub phase: String,
}

fn require_candidate_id(candidate_id: &str) -> Result<&str, ApiError> {
    let trimmed = candidate_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("candidate_id is required".into()));
    }
    Ok(trimmed)
}

pub async fn behavior(
    State(state): State<SharedState>,
    Path(candidate_id): Path<String>,
    _auth: AuthUser,
) -> Result<Json<BehaviorReport>, ApiError> {
    let candidate_id = require_candidate_id(&candidate_id)?;
    let report = behavior_report(state.workbook.as_ref(), candidate_id).await?;
    Ok(Json(report))
}

/// 404 when the successful send or the response for the phase is missing.
pub async fn response_speed(
    State(state): State<SharedState>,
    Path(candidate_id): Path<String>,
    Query(query): Query<ResponseSpeedQuery>,
    _auth: AuthUser,
) -> Result<Json<ResponseSpeed>, ApiError> {
    let candidate_id = require_candidate_id(&candidate_id)?;
    let phase = query.phase.trim();
    if phase.is_empty() {
        return Err(ApiError::BadRequest("phase is required".into()));
    }

    analyze_response_speed(state.workbook.as_ref(), candidate_id, phase)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no completed survey exchange for {candidate_id} in {phase}"
            ))
        })
}
