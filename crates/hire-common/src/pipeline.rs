//! Webhook ingestion: routes a request body to the behavior query, the test
//! acknowledgement or the production write path, and always answers with a
//! JSON envelope.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use hire_metrics::{
    INGESTION_DURATION_SECONDS, INGESTION_TOTAL, REPORT_FAILURES_TOTAL, ROLLUP_SOFT_MISS_TOTAL,
};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{Span, debug, error, info, instrument, warn};

use crate::behavior::{BehaviorReport, behavior_report};
use crate::locks::KeyedLocks;
use crate::payload::{
    IngestPayload, PRODUCTION_MODE, PayloadError, TEST_MODE, ValidatedInput, WebhookRequest,
};
use crate::records::{
    ArchiveRecord, CandidateRecord, CandidateStatus, ProcessingLogEntry, ProcessingStatus,
    workflow::truncate_chars,
};
use crate::report::{
    EvaluationReportRequest, ReportContext, ReportError, ReportGenerator, StrategyReportRequest,
};
use crate::rollup::{RollupOutcome, update_candidate_scores, update_candidates_master};
use crate::schema::{ARCHIVE, CANDIDATE_ID, CANDIDATES_MASTER, EVALUATION_MASTER};
use crate::workbook::{Cell, RowNumber, SharedWorkbook, WorkbookError};
use crate::writers::{
    Upserted, WriterError, append_engagement, append_evaluation, append_processing_log,
    append_score_snapshot, append_workflow_log, set_row_values, write_archive, write_candidate,
    write_insight,
};

pub const DEFAULT_COMPANY_NAME: &str = "アマネク";
const DEFAULT_SELECTION_PHASE: &str = "1次面接";
const DEFAULT_RECRUIT_TYPE: &str = "新卒";

const TEST_PHASE: &str = "Phase1-1_Test";
const TEST_EVENT: &str = "webhook_test";
const PRODUCTION_PHASE: &str = "Phase1_Production";
const PRODUCTION_EVENT: &str = "workflow_execution";
const TEST_DETAIL_MAX_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSettings {
    pub company_name: String,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            company_name: DEFAULT_COMPANY_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupResults {
    pub candidate_scores: RollupOutcome,
    pub candidates_master: RollupOutcome,
}

/// Per-section outcomes of one production request. Sections that were not in
/// the payload serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestResults {
    pub candidates_master: Option<Upserted>,
    pub candidate_scores: Option<RowNumber>,
    pub candidate_insights: Option<Upserted>,
    pub engagement_log: Option<String>,
    pub evaluation_master: Option<String>,
    pub workflow_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_report_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy_report_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_generation_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollupResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<Upserted>,
}

fn elapsed_seconds(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}

fn elapsed_note(seconds: f64) -> String {
    format!("実行時間: {seconds:.2}秒")
}

/// Error message followed by each `source()` on its own line.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

fn observe(mode: &'static str, outcome: &'static str, started: Instant) {
    counter!(INGESTION_TOTAL, "mode" => mode, "outcome" => outcome).increment(1);
    histogram!(INGESTION_DURATION_SECONDS, "mode" => mode).record(started.elapsed().as_secs_f64());
}

pub struct IngestionService {
    workbook: SharedWorkbook,
    reports: Arc<dyn ReportGenerator>,
    locks: KeyedLocks,
    settings: IngestionSettings,
}

impl IngestionService {
    pub fn new(
        workbook: SharedWorkbook,
        reports: Arc<dyn ReportGenerator>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            workbook,
            reports,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn workbook(&self) -> &SharedWorkbook {
        &self.workbook
    }

    /// Handle a raw webhook body. Never fails: errors become a
    /// `success: false` envelope.
    pub async fn handle(&self, body: &[u8]) -> Value {
        let started = Instant::now();
        match WebhookRequest::parse(body) {
            Ok(request) => self.dispatch(request, started).await,
            Err(err) => {
                self.failure(PRODUCTION_MODE, "unknown".to_string(), &PipelineError::from(err), started)
                    .await
            }
        }
    }

    pub async fn dispatch(&self, request: WebhookRequest, started: Instant) -> Value {
        let mode = request.mode();
        match request {
            WebhookRequest::BehaviorQuery { candidate_id } => {
                self.behavior_query(candidate_id.as_deref(), started).await
            }
            WebhookRequest::Test {
                validated_input,
                transcript,
            } => {
                let label = validated_input
                    .as_ref()
                    .and_then(|input| input.candidate_name.clone())
                    .unwrap_or_else(|| "Test".to_string());
                match self
                    .acknowledge_test(validated_input, transcript.as_deref(), started)
                    .await
                {
                    Ok(envelope) => envelope,
                    Err(err) => self.failure(mode, label, &err, started).await,
                }
            }
            WebhookRequest::Ingest(payload) => {
                let label = payload.candidate_label();
                match self.ingest(&payload, started).await {
                    Ok(envelope) => envelope,
                    Err(err) => self.failure(mode, label, &err, started).await,
                }
            }
        }
    }

    /// Read-only behavior report. A missing id is reported in the envelope.
    #[instrument(skip(self, started))]
    pub async fn behavior_query(&self, candidate_id: Option<&str>, started: Instant) -> Value {
        let Some(candidate_id) = candidate_id else {
            return json!({"success": false, "error": "candidate_id is required"});
        };

        match behavior_report(self.workbook.as_ref(), candidate_id).await {
            Ok(report) => behavior_envelope(report, started),
            Err(err) => {
                error!(error = %err, "behavior query failed");
                json!({
                    "success": false,
                    "error": err.to_string(),
                    "stack": error_chain(&err),
                })
            }
        }
    }

    #[instrument(skip_all)]
    async fn acknowledge_test(
        &self,
        validated_input: Option<ValidatedInput>,
        transcript: Option<&str>,
        started: Instant,
    ) -> Result<Value, PipelineError> {
        let input = validated_input.unwrap_or_default();
        let transcript_length = transcript.map(|t| t.chars().count()).unwrap_or(0);
        let detail = serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string());
        let transcript_note = match transcript {
            Some(_) => format!("transcript: {transcript_length}文字"),
            None => "transcript: なし".to_string(),
        };

        let now = Utc::now();
        let elapsed = elapsed_seconds(started);
        let entry = ProcessingLogEntry {
            timestamp: now,
            phase: TEST_PHASE.to_string(),
            candidate: input.candidate_name.clone().unwrap_or_else(|| "Test".to_string()),
            event: TEST_EVENT.to_string(),
            status: ProcessingStatus::Success,
            detail: truncate_chars(&detail, TEST_DETAIL_MAX_CHARS),
            error: String::new(),
            notes: format!("{transcript_note} / {}", elapsed_note(elapsed)),
        };
        append_processing_log(self.workbook.as_ref(), &entry, now).await?;

        observe(TEST_MODE, "success", started);
        info!("test-mode webhook acknowledged");
        Ok(json!({
            "success": true,
            "mode": TEST_MODE,
            "message": "データ受信成功（テストモード）",
            "received": {
                "candidate_id": input.candidate_id,
                "candidate_name": input.candidate_name,
                "has_transcript": transcript.is_some(),
                "transcript_length": transcript_length,
            },
            "timestamp": Utc::now().to_rfc3339(),
            "execution_time_seconds": elapsed_seconds(started),
        }))
    }

    #[instrument(skip_all, fields(candidate_id = tracing::field::Empty))]
    async fn ingest(&self, payload: &IngestPayload, started: Instant) -> Result<Value, PipelineError> {
        let candidate_id = payload.candidate_id();
        if let Some(id) = &candidate_id {
            Span::current().record("candidate_id", id.as_str());
        }
        let guard = match &candidate_id {
            Some(id) => Some(self.locks.lock(id).await),
            None => None,
        };

        let results = self.write_all(payload, candidate_id.as_deref(), started).await;
        drop(guard);
        self.locks.prune();
        let results = results?;

        let elapsed = elapsed_seconds(started);
        observe(PRODUCTION_MODE, "success", started);
        info!(elapsed, "ingestion complete");
        Ok(json!({
            "success": true,
            "mode": PRODUCTION_MODE,
            "message": "データ処理完了",
            "results": results,
            "timestamp": Utc::now().to_rfc3339(),
            "execution_time_seconds": elapsed,
        }))
    }

    async fn write_all(
        &self,
        payload: &IngestPayload,
        candidate_id: Option<&str>,
        started: Instant,
    ) -> Result<IngestResults, PipelineError> {
        let workbook = self.workbook.as_ref();
        let now = Utc::now();
        let mut results = IngestResults::default();

        if let Some(warning) = payload
            .candidate_scores
            .as_ref()
            .and_then(|scores| scores.axis_sum_warning())
        {
            warn!(%warning, "score totals do not add up");
            results.validation_warnings.push(warning);
        }

        if let Some(candidate) = &payload.candidates_master {
            results.candidates_master = Some(write_candidate(workbook, candidate, now).await?);
        }
        if let Some(scores) = &payload.candidate_scores {
            results.candidate_scores = Some(append_score_snapshot(workbook, scores, now).await?);
        }
        if let Some(insight) = &payload.candidate_insights {
            results.candidate_insights = Some(write_insight(workbook, insight, now).await?);
        }
        if let Some(engagement) = &payload.engagement_log {
            results.engagement_log = Some(append_engagement(workbook, engagement, now).await?);
        }
        let mut evaluation_row = None;
        if let Some(evaluation) = &payload.evaluation_master {
            let (evaluation_id, row) = append_evaluation(workbook, evaluation, now).await?;
            results.evaluation_master = Some(evaluation_id);
            evaluation_row = Some(row);
        }

        if let Err(err) = self.generate_reports(payload, &mut results, now).await {
            warn!(error = %err, "report generation failed");
            counter!(REPORT_FAILURES_TOTAL).increment(1);
            results.report_generation_error = Some(err.to_string());
        }
        if let Some(row) = evaluation_row {
            let urls: Vec<(&'static str, Cell)> = [
                ("evaluation_report_url", &results.evaluation_report_url),
                ("strategy_report_url", &results.strategy_report_url),
            ]
            .into_iter()
            .filter_map(|(header, url)| url.clone().map(|url| (header, Cell::Text(url))))
            .collect();
            if !urls.is_empty() {
                set_row_values(workbook, EVALUATION_MASTER, row, urls).await?;
            }
        }

        if let Some(id) = candidate_id {
            let scores = update_candidate_scores(workbook, id, now).await?;
            let master = update_candidates_master(workbook, id, now).await?;
            for (target, outcome) in [("candidate_scores", &scores), ("candidates_master", &master)] {
                if !outcome.success {
                    counter!(ROLLUP_SOFT_MISS_TOTAL, "target" => target).increment(1);
                }
            }
            results.rollup = Some(RollupResults {
                candidate_scores: scores,
                candidates_master: master,
            });
        }

        if let Some(candidate) = &payload.candidates_master {
            results.archive = self.archive_if_accepted(candidate, now).await?;
        }

        if let Some(workflow) = &payload.workflow_log {
            let mut record = workflow.clone();
            record.execution_time_seconds = Some(elapsed_seconds(started));
            results.workflow_log = Some(append_workflow_log(workbook, &record, now).await?);
        }

        let entry = ProcessingLogEntry {
            timestamp: Utc::now(),
            phase: PRODUCTION_PHASE.to_string(),
            candidate: payload.candidate_label(),
            event: PRODUCTION_EVENT.to_string(),
            status: ProcessingStatus::Success,
            detail: String::new(),
            error: String::new(),
            notes: elapsed_note(elapsed_seconds(started)),
        };
        append_processing_log(workbook, &entry, now).await?;

        Ok(results)
    }

    /// Requests both reports when the payload has what they need. The first
    /// failure stops generation; URLs already returned are kept.
    async fn generate_reports(
        &self,
        payload: &IngestPayload,
        results: &mut IngestResults,
        now: DateTime<Utc>,
    ) -> Result<(), ReportError> {
        let (Some(candidate), Some(input)) = (&payload.candidates_master, &payload.validated_input) else {
            return Ok(());
        };
        if !self.reports.is_enabled() {
            debug!("report generator disabled");
            return Ok(());
        }

        let context = ReportContext {
            candidate_id: input
                .candidate_id
                .clone()
                .unwrap_or_else(|| candidate.candidate_id.clone()),
            candidate_name: candidate
                .display_name()
                .or(input.candidate_name.as_deref())
                .unwrap_or_default()
                .to_string(),
            interviewer: input.interviewer.clone(),
            selection_phase: candidate
                .status
                .as_ref()
                .map(|status| status.as_str().to_string())
                .or_else(|| input.selection_phase.clone())
                .unwrap_or_else(|| DEFAULT_SELECTION_PHASE.to_string()),
            recruit_type: candidate
                .category
                .clone()
                .or_else(|| input.recruit_type.clone())
                .unwrap_or_else(|| DEFAULT_RECRUIT_TYPE.to_string()),
            company_name: self.settings.company_name.clone(),
        };

        if let Some(evaluation) = &payload.evaluation_master {
            let request = EvaluationReportRequest::build(context.clone(), evaluation, now);
            results.evaluation_report_url = Some(self.reports.evaluation_report(&request).await?);
        }
        if let Some(engagement) = &payload.engagement_log {
            let request = StrategyReportRequest::build(context, engagement);
            results.strategy_report_url = Some(self.reports.strategy_report(&request).await?);
        }
        Ok(())
    }

    /// Copy an accepted candidate's final figures into the archive.
    async fn archive_if_accepted(
        &self,
        candidate: &CandidateRecord,
        now: DateTime<Utc>,
    ) -> Result<Option<Upserted>, PipelineError> {
        if !candidate.status.as_ref().is_some_and(CandidateStatus::is_accepted) {
            return Ok(None);
        }
        let workbook = self.workbook.as_ref();
        let key = candidate.candidate_id.trim();

        let master = workbook.rows(CANDIDATES_MASTER).await?;
        let layout = master.layout();
        let row = master
            .column(CANDIDATE_ID)
            .and_then(|column| master.rows_with_key(column, key).next())
            .map(|(_, cells)| cells);
        let value = |header: &str| row.map(|cells| layout.get(cells, header).clone()).unwrap_or_default();

        let archive = workbook.rows(ARCHIVE).await?;
        let accepted_at = archive
            .column(CANDIDATE_ID)
            .and_then(|column| archive.rows_with_key(column, key).next())
            .and_then(|(_, cells)| archive.layout().get(cells, "accepted_at").as_timestamp())
            .unwrap_or(now);

        let record = ArchiveRecord {
            candidate_id: key.to_string(),
            name: candidate.display_name().map(str::to_string),
            category: candidate.category.clone(),
            accepted_at,
            final_pass_probability: value("latest_pass_probability").as_f64(),
            final_acceptance_probability: value("latest_acceptance_final").as_f64(),
            final_rank: value("latest_rank").as_text(),
            interview_count: value("interview_count").as_f64(),
            archived_at: now,
        };
        info!(candidate_id = key, "archiving accepted candidate");
        Ok(Some(write_archive(workbook, &record, now).await?))
    }

    async fn failure(
        &self,
        mode: &'static str,
        candidate: String,
        err: &PipelineError,
        started: Instant,
    ) -> Value {
        error!(mode, error = %err, "webhook request failed");
        let (phase, event) = if mode == TEST_MODE {
            (TEST_PHASE, TEST_EVENT)
        } else {
            (PRODUCTION_PHASE, PRODUCTION_EVENT)
        };
        let now = Utc::now();
        let entry = ProcessingLogEntry {
            timestamp: now,
            phase: phase.to_string(),
            candidate,
            event: event.to_string(),
            status: ProcessingStatus::Failed,
            detail: String::new(),
            error: err.to_string(),
            notes: elapsed_note(elapsed_seconds(started)),
        };
        if let Err(log_err) = append_processing_log(self.workbook.as_ref(), &entry, now).await {
            warn!(error = %log_err, "could not record failure in processing log");
        }

        observe(mode, "failure", started);
        json!({
            "success": false,
            "mode": mode,
            "error": err.to_string(),
            "stack": error_chain(err),
            "timestamp": now.to_rfc3339(),
        })
    }
}

fn behavior_envelope(report: BehaviorReport, started: Instant) -> Value {
    let message = if report.has_data {
        "行動データ取得成功"
    } else {
        "データが見つかりませんでした"
    };
    json!({
        "success": true,
        "data": report,
        "message": message,
        "execution_time_seconds": elapsed_seconds(started),
    })
}
