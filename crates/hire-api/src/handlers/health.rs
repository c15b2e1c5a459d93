use axum::{Json, extract::State};
use serde_json::json;
use tokio::time::{Duration, timeout};

use crate::SharedState;
use crate::error::ApiError;

const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn livez() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.readiness.load(std::sync::atomic::Ordering::SeqCst) {
        return Err(ApiError::ServiceUnavailable("shutting_down".into()));
    }

    timeout(READINESS_TIMEOUT, state.workbook.ping())
        .await
        .map_err(|_| ApiError::ServiceUnavailable("workbook_ping_timeout".into()))
        .and_then(|result| {
            result.map_err(|err| ApiError::ServiceUnavailable(format!("workbook check failed: {err}")))
        })?;

    Ok(Json(json!({
        "status": "ok",
        "workbook": state.workbook.backend(),
        "application": env!("CARGO_PKG_NAME"),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readyz_rejects_when_readiness_disabled() {
        let state = crate::test_state("test-key");
        state
            .readiness
            .store(false, std::sync::atomic::Ordering::SeqCst);

        let result = readyz(State(state)).await;

        match result {
            Err(ApiError::ServiceUnavailable(code)) => {
                assert!(code.contains("shutting_down"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn readyz_reports_the_workbook_backend() {
        let state = crate::test_state("test-key");

        let Json(body) = readyz(State(state)).await.unwrap();

        assert_eq!(body["status"], "ok");
        assert_eq!(body["workbook"], "memory");
    }
}
