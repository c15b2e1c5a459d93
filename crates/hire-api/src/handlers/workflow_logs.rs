use axum::{
    Json,
    extract::{Query, State},
};
use hire_common::workflow_logs::{DEFAULT_RECENT_LIMIT, recent_workflow_logs};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::SharedState;
use crate::auth::AuthUser;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

const fn default_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

pub async fn recent(
    State(state): State<SharedState>,
    Query(query): Query<RecentQuery>,
    _auth: AuthUser,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let rows = recent_workflow_logs(state.workbook.as_ref(), query.limit).await?;
    Ok(Json(rows))
}
