use axum::{Json, body::Bytes, extract::State};
use serde_json::Value;
use tracing::debug;

use crate::SharedState;
use crate::auth::AuthUser;

/// Webhook entry point. Pipeline failures come back as a `success: false`
/// envelope with status 200; only auth, rate-limit and body-size rejections
/// produce HTTP errors.
pub async fn receive(State(state): State<SharedState>, auth: AuthUser, body: Bytes) -> Json<Value> {
    debug!(subject = %auth.subject, bytes = body.len(), "webhook received");
    Json(state.ingestion.handle(&body).await)
}
