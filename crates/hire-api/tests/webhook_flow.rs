use axum::{Router, body::Body, http::Request, http::StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const KEY: &str = "test-key";

fn app() -> Router {
    hire_api::create_router(hire_api::test_state(KEY))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", KEY)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn production_payload() -> Value {
    json!({
        "validated_input": {"candidate_id": "C-100", "candidate_name": "鈴木 花子"},
        "candidates_master": {"candidate_id": "C-100", "氏名": "鈴木 花子"},
        "candidate_scores": {"candidate_id": "C-100", "latest_total_score": 72},
        "engagement_log": {
            "candidate_id": "C-100",
            "acceptance_rate_ai": 55,
            "acceptance_rate_final": 60,
            "confidence_level": "MEDIUM",
        },
        "evaluation_master": {
            "candidate_id": "C-100",
            "interview_datetime": "2024-06-01 10:00",
            "total_rank": "B",
        },
        "workflow_log": "{\"candidate_id\":\"C-100\",\"status\":\"SUCCESS\"}",
    })
}

#[tokio::test]
async fn test_mode_is_acknowledged() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/webhook",
        Some(json!({
            "test_mode": true,
            "validated_input": {"candidate_id": "C-100", "candidate_name": "鈴木"},
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["mode"], json!("TEST_MODE"));
    assert_eq!(body["received"]["candidate_id"], json!("C-100"));
}

#[tokio::test]
async fn production_ingestion_is_visible_to_operator_reads() {
    let app = app();

    let (status, body) = send(&app, "POST", "/api/webhook", Some(production_payload())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true), "{body}");
    assert_eq!(body["mode"], json!("PRODUCTION"));
    assert_eq!(body["results"]["candidates_master"]["status"], json!("INSERTED"));
    assert!(body["results"]["evaluation_master"].is_string());
    assert!(body["execution_time_seconds"].is_number());

    let (_, again) = send(&app, "POST", "/webhook", Some(production_payload())).await;
    assert_eq!(again["results"]["candidates_master"]["status"], json!("UPDATED"));

    let (status, logs) = send(&app, "GET", "/api/workflow-logs/recent?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["candidate_id"], json!("C-100"));
}

#[tokio::test]
async fn malformed_body_becomes_a_failure_envelope() {
    let app = app();

    let (status, body) = send(&app, "POST", "/webhook", Some(json!(["not", "an", "object"]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
    assert!(body["stack"].is_string());
}

#[tokio::test]
async fn behavior_query_through_the_webhook() {
    let app = app();

    let (_, missing) = send(
        &app,
        "POST",
        "/webhook",
        Some(json!({"action": "get_behavior_data"})),
    )
    .await;
    assert_eq!(missing["success"], json!(false));

    let (status, body) = send(
        &app,
        "POST",
        "/webhook",
        Some(json!({"action": "get_behavior_data", "candidate_id": "C-404"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["has_data"], json!(false));
    assert_eq!(body["data"]["behavior_summary"], json!("データなし"));
}

#[tokio::test]
async fn survey_exchange_feeds_response_speed_and_behavior() {
    let app = app();

    let (status, _) = send(
        &app,
        "GET",
        "/api/candidates/C-7/response-speed?phase=after_first_interview",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, sent) = send(
        &app,
        "POST",
        "/api/surveys/sends",
        Some(json!({
            "candidate_id": "C-7",
            "phase": "after_first_interview",
            "send_time": "2024-06-01T00:00:00Z",
            "send_status": "success",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["send_status"], json!("success"));

    let (status, duplicate) = send(
        &app,
        "POST",
        "/api/surveys/sends",
        Some(json!({
            "candidate_id": "C-7",
            "phase": "after_first_interview",
            "send_time": "2024-06-01T01:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["code"], json!("conflict"));

    let (status, _) = send(
        &app,
        "POST",
        "/api/surveys/responses",
        Some(json!({
            "candidate_id": "C-7",
            "phase": "after_first_interview",
            "response_time": "2024-06-01T01:30:00Z",
            "aspiration": 8,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, speed) = send(
        &app,
        "GET",
        "/api/candidates/C-7/response-speed?phase=after_first_interview",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(speed["response_time_hours"], json!(1.5));
    assert_eq!(speed["response_speed_score"], json!(100));

    let (status, behavior) = send(&app, "GET", "/api/candidates/C-7/behavior", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(behavior["survey_count"], json!(1));
    assert_eq!(behavior["response_count"], json!(1));
}

#[tokio::test]
async fn survey_response_validation_is_a_bad_request() {
    let app = app();

    let (status, body) = send(
        &app,
        "POST",
        "/api/surveys/responses",
        Some(json!({"candidate_id": "C-7", "phase": "after_first_interview", "aspiration": 11})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("bad_request"));
}
