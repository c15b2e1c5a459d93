//! Webhook body parsing. Every section is normalized into its typed record
//! before any writer runs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::records::{
    CandidateRecord, EngagementRecord, EvaluationRecord, InsightRecord, ScoreSnapshotRecord,
    WorkflowLogRecord, lenient,
};

pub const BEHAVIOR_ACTION: &str = "get_behavior_data";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("section `{section}` is invalid: {reason}")]
    InvalidSection { section: &'static str, reason: String },
}

/// `validated_input`: the upstream workflow's view of who was interviewed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatedInput {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub candidate_name: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub interviewer: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub selection_phase: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub recruit_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Production payload with each present section already typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestPayload {
    pub validated_input: Option<ValidatedInput>,
    pub transcript: Option<String>,
    pub candidates_master: Option<CandidateRecord>,
    pub candidate_scores: Option<ScoreSnapshotRecord>,
    pub candidate_insights: Option<InsightRecord>,
    pub engagement_log: Option<EngagementRecord>,
    pub evaluation_master: Option<EvaluationRecord>,
    pub workflow_log: Option<WorkflowLogRecord>,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl IngestPayload {
    /// Candidate the request is about: `validated_input` first, then the
    /// first section that carries an id.
    pub fn candidate_id(&self) -> Option<String> {
        self.validated_input
            .as_ref()
            .and_then(|input| input.candidate_id.as_deref())
            .and_then(non_blank)
            .or_else(|| {
                [
                    self.candidates_master.as_ref().map(|r| r.candidate_id.as_str()),
                    self.candidate_scores.as_ref().map(|r| r.candidate_id.as_str()),
                    self.candidate_insights.as_ref().map(|r| r.candidate_id.as_str()),
                    self.engagement_log.as_ref().map(|r| r.candidate_id.as_str()),
                    self.evaluation_master.as_ref().map(|r| r.candidate_id.as_str()),
                    self.workflow_log.as_ref().map(|r| r.candidate_id.as_str()),
                ]
                .into_iter()
                .flatten()
                .find_map(non_blank)
            })
    }

    pub fn candidate_label(&self) -> String {
        let input = self.validated_input.as_ref();
        input
            .and_then(|i| i.candidate_name.clone())
            .or_else(|| input.and_then(|i| i.candidate_id.clone()))
            .or_else(|| self.candidate_id())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookRequest {
    /// Read-only behavior query.
    BehaviorQuery { candidate_id: Option<String> },
    /// Connectivity check: one audit row, no entity writes.
    Test {
        validated_input: Option<ValidatedInput>,
        transcript: Option<String>,
    },
    Ingest(Box<IngestPayload>),
}

impl WebhookRequest {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(object) = value else {
            return Err(PayloadError::NotAnObject);
        };
        Self::from_object(&object)
    }

    pub fn from_object(object: &Map<String, Value>) -> Result<Self, PayloadError> {
        if object.get("action").and_then(Value::as_str) == Some(BEHAVIOR_ACTION) {
            let candidate_id = object.get("candidate_id").and_then(scalar_text);
            return Ok(Self::BehaviorQuery { candidate_id });
        }

        let validated_input = section(object, "validated_input")?;
        let transcript = object.get("transcript").and_then(scalar_text);

        if is_truthy(object.get("test_mode")) {
            return Ok(Self::Test {
                validated_input,
                transcript,
            });
        }

        Ok(Self::Ingest(Box::new(IngestPayload {
            validated_input,
            transcript,
            candidates_master: section(object, "candidates_master")?,
            candidate_scores: section(object, "candidate_scores")?,
            candidate_insights: section(object, "candidate_insights")?,
            engagement_log: section(object, "engagement_log")?,
            evaluation_master: section(object, "evaluation_master")?,
            workflow_log: section(object, "workflow_log")?,
        })))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Test { .. } => TEST_MODE,
            _ => PRODUCTION_MODE,
        }
    }
}

pub const TEST_MODE: &str = "TEST_MODE";
pub const PRODUCTION_MODE: &str = "PRODUCTION";

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => non_blank(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// A section is either an object or a string holding a JSON object.
fn section<T: DeserializeOwned>(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<T>, PayloadError> {
    let invalid = |reason: String| PayloadError::InvalidSection {
        section: name,
        reason,
    };

    let value = match object.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(value @ Value::Object(_)) => value.clone(),
        Some(Value::String(raw)) => {
            let parsed: Value = serde_json::from_str(raw).map_err(|err| invalid(err.to_string()))?;
            if !parsed.is_object() {
                return Err(invalid("encoded value is not an object".to_string()));
            }
            parsed
        }
        Some(other) => {
            return Err(invalid(format!("expected an object, found {}", json_kind(other))));
        }
    };

    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| invalid(err.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: Value) -> Result<WebhookRequest, PayloadError> {
        WebhookRequest::parse(value.to_string().as_bytes())
    }

    #[test]
    fn behavior_action_wins_over_everything() {
        let request = parse(json!({
            "action": "get_behavior_data",
            "candidate_id": "C-1",
            "test_mode": true
        }))
        .unwrap();
        assert_eq!(
            request,
            WebhookRequest::BehaviorQuery {
                candidate_id: Some("C-1".into())
            }
        );
    }

    #[test]
    fn test_mode_flag() {
        let request = parse(json!({
            "test_mode": true,
            "validated_input": {"candidate_id": "C-1", "candidate_name": "Ann"},
            "transcript": "hello"
        }))
        .unwrap();
        assert_eq!(request.mode(), TEST_MODE);
        let WebhookRequest::Test { validated_input, transcript } = request else {
            panic!("expected test mode");
        };
        assert_eq!(validated_input.unwrap().candidate_name.as_deref(), Some("Ann"));
        assert_eq!(transcript.as_deref(), Some("hello"));
    }

    #[test]
    fn sections_accept_objects_and_encoded_strings() {
        let request = parse(json!({
            "candidates_master": {"candidate_id": "C-1", "氏名": "山田"},
            "engagement_log": "{\"candidate_id\":\"C-1\",\"acceptance_rate_ai\":\"65\"}"
        }))
        .unwrap();
        let WebhookRequest::Ingest(payload) = request else {
            panic!("expected ingestion");
        };
        assert_eq!(payload.candidates_master.unwrap().display_name(), Some("山田"));
        assert_eq!(payload.engagement_log.unwrap().acceptance_rate_ai, Some(65.0));
        assert!(payload.evaluation_master.is_none());
    }

    #[test]
    fn non_object_sections_fail_the_request() {
        let err = parse(json!({"candidate_scores": [1, 2, 3]})).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::InvalidSection { section: "candidate_scores", .. }
        ));

        let err = parse(json!({"evaluation_master": "not json"})).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidSection { .. }));

        let err = parse(json!({"workflow_log": "[1]"})).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidSection { section: "workflow_log", .. }));
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(matches!(parse(json!([1])), Err(PayloadError::NotAnObject)));
        assert!(matches!(
            WebhookRequest::parse(b"{oops"),
            Err(PayloadError::Malformed(_))
        ));
    }

    #[test]
    fn candidate_id_prefers_validated_input() {
        let WebhookRequest::Ingest(payload) = parse(json!({
            "validated_input": {"candidate_id": " C-9 "},
            "candidates_master": {"candidate_id": "C-1"}
        }))
        .unwrap() else {
            panic!("expected ingestion");
        };
        assert_eq!(payload.candidate_id().as_deref(), Some("C-9"));

        let WebhookRequest::Ingest(payload) = parse(json!({
            "evaluation_master": {"candidate_id": "C-3"}
        }))
        .unwrap() else {
            panic!("expected ingestion");
        };
        assert_eq!(payload.candidate_id().as_deref(), Some("C-3"));
        assert_eq!(payload.candidate_label(), "C-3");
    }
}
