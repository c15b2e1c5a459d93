//! Header-addressed writers for every entity table.
//!
//! Append-only writers build a full row by header name and append it.
//! Upsert writers scan the key column top to bottom, overwrite the first
//! match in place or append when there is none.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::ids;
use crate::records::{
    ArchiveRecord, CandidateRecord, EngagementRecord, EvaluationRecord, InsightRecord, Keyed,
    ProcessingLogEntry, RowSchema, ScoreSnapshotRecord, SurveyResponseRecord, SurveySendRecord,
    WorkflowLogRecord,
};
use crate::schema::{EVALUATION_MASTER, LAST_UPDATED_AT};
use crate::timezone::business_date;
use crate::workbook::{Cell, HeaderIndex, RowNumber, Workbook, WorkbookError, cell_at};

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("table {table} has no {column} column")]
    MissingKeyColumn { table: String, column: String },
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Upserted {
    pub status: UpsertStatus,
    pub row: RowNumber,
}

/// Serializes evaluation-id allocation so two evaluations written in the same
/// instant never share a sequence number.
static EVALUATION_ID_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Lay `values` over `base` (or an empty row) by header name. Values whose
/// header the table lacks are skipped; later values win over earlier ones.
fn build_row(
    table: &str,
    layout: &HeaderIndex,
    base: Option<&[Cell]>,
    values: Vec<(&'static str, Cell)>,
) -> Vec<Cell> {
    let mut row = base.map(<[Cell]>::to_vec).unwrap_or_default();
    if row.len() < layout.width() {
        row.resize(layout.width(), Cell::Empty);
    }

    for (header, cell) in values {
        match layout.position(header) {
            Some(idx) => row[idx] = cell,
            None => warn!(table, header, "column missing from table; value skipped"),
        }
    }
    row
}

fn stamp(values: &mut Vec<(&'static str, Cell)>, now: DateTime<Utc>) {
    values.push((LAST_UPDATED_AT, Cell::Timestamp(now)));
}

/// Append `record`, with `extra` values layered on top of its own cells.
#[instrument(skip_all, fields(table = R::TABLE))]
pub async fn append_record<R: RowSchema>(
    workbook: &dyn Workbook,
    record: &R,
    extra: Vec<(&'static str, Cell)>,
    now: DateTime<Utc>,
) -> Result<RowNumber, WriterError> {
    let headers = workbook.headers(R::TABLE).await?;
    let layout = HeaderIndex::new(&headers);

    let mut values = record.cells();
    values.extend(extra);
    if layout.position(LAST_UPDATED_AT).is_some() {
        stamp(&mut values, now);
    }

    let row = build_row(R::TABLE, &layout, None, values);
    let number = workbook.append_row(R::TABLE, row).await?;
    debug!(row = number, "row appended");
    Ok(number)
}

/// Update the first row whose key matches, or append a new one.
///
/// Every schema column present in the table is rewritten (absent payload
/// fields become empty). Columns the schema does not know keep their value.
#[instrument(skip_all, fields(table = R::TABLE, key = record.key()))]
pub async fn upsert_record<R: Keyed>(
    workbook: &dyn Workbook,
    record: &R,
    now: DateTime<Utc>,
) -> Result<Upserted, WriterError> {
    let key = record.key();
    if key.is_empty() {
        return Err(WriterError::Validation(format!("{} is required", R::KEY)));
    }

    let snapshot = workbook.rows(R::TABLE).await?;
    let layout = snapshot.layout();
    let key_column = layout
        .position(R::KEY)
        .ok_or_else(|| WriterError::MissingKeyColumn {
            table: R::TABLE.to_string(),
            column: R::KEY.to_string(),
        })?;

    let mut values = record.cells();
    stamp(&mut values, now);

    let found = snapshot.rows_with_key(key_column, key).next();
    match found {
        Some((row, existing)) => {
            let cells = build_row(R::TABLE, &layout, Some(existing), values);
            workbook.update_row(R::TABLE, row, cells).await?;
            debug!(row, "row updated");
            Ok(Upserted {
                status: UpsertStatus::Updated,
                row,
            })
        }
        None => {
            let cells = build_row(R::TABLE, &layout, None, values);
            let row = workbook.append_row(R::TABLE, cells).await?;
            debug!(row, "row inserted");
            Ok(Upserted {
                status: UpsertStatus::Inserted,
                row,
            })
        }
    }
}

/// Overwrite individual cells of `row` by header name. Returns the headers
/// the table does not have (nothing is written for those).
pub async fn set_row_values(
    workbook: &dyn Workbook,
    table: &str,
    row: RowNumber,
    values: Vec<(&'static str, Cell)>,
) -> Result<Vec<&'static str>, WorkbookError> {
    let headers = workbook.headers(table).await?;
    let layout = HeaderIndex::new(&headers);

    let mut cells = Vec::with_capacity(values.len());
    let mut skipped = Vec::new();
    for (header, cell) in values {
        match layout.position(header) {
            Some(idx) => cells.push((idx, cell)),
            None => {
                warn!(table, header, "column missing from table; value skipped");
                skipped.push(header);
            }
        }
    }

    if !cells.is_empty() {
        workbook.set_cells(table, row, cells).await?;
    }
    Ok(skipped)
}

fn id_or_generated(existing: &Option<String>, prefix: &str) -> String {
    existing
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ids::prefixed(prefix))
}

pub async fn write_candidate(
    workbook: &dyn Workbook,
    record: &CandidateRecord,
    now: DateTime<Utc>,
) -> Result<Upserted, WriterError> {
    upsert_record(workbook, record, now).await
}

pub async fn write_insight(
    workbook: &dyn Workbook,
    record: &InsightRecord,
    now: DateTime<Utc>,
) -> Result<Upserted, WriterError> {
    upsert_record(workbook, record, now).await
}

pub async fn write_archive(
    workbook: &dyn Workbook,
    record: &ArchiveRecord,
    now: DateTime<Utc>,
) -> Result<Upserted, WriterError> {
    upsert_record(workbook, record, now).await
}

/// Appends a score snapshot and returns its row number.
pub async fn append_score_snapshot(
    workbook: &dyn Workbook,
    record: &ScoreSnapshotRecord,
    now: DateTime<Utc>,
) -> Result<RowNumber, WriterError> {
    append_record(workbook, record, Vec::new(), now).await
}

/// Appends an engagement log row and returns its `log_id`.
pub async fn append_engagement(
    workbook: &dyn Workbook,
    record: &EngagementRecord,
    now: DateTime<Utc>,
) -> Result<String, WriterError> {
    let log_id = id_or_generated(&record.log_id, "LOG");
    let mut extra = vec![("log_id", Cell::text(log_id.clone()))];
    if record.timestamp.is_none() {
        extra.push(("timestamp", Cell::Timestamp(now)));
    }

    append_record(workbook, record, extra, now).await?;
    Ok(log_id)
}

/// Appends an evaluation and returns its generated id with the row number.
pub async fn append_evaluation(
    workbook: &dyn Workbook,
    record: &EvaluationRecord,
    now: DateTime<Utc>,
) -> Result<(String, RowNumber), WriterError> {
    let _sequence = EVALUATION_ID_LOCK.lock().await;

    let snapshot = workbook.rows(EVALUATION_MASTER).await?;
    let day_prefix = ids::evaluation_id_day_prefix(business_date(now));
    let issued_today = snapshot
        .column("evaluation_id")
        .map(|column| {
            snapshot
                .rows
                .iter()
                .filter(|row| cell_at(row, column).display().starts_with(&day_prefix))
                .count()
        })
        .unwrap_or(0);

    let evaluation_id = ids::evaluation_id(business_date(now), issued_today);
    let extra = vec![
        ("evaluation_id", Cell::text(evaluation_id.clone())),
        ("created_at", Cell::Timestamp(now)),
    ];

    let row = append_record(workbook, record, extra, now).await?;
    Ok((evaluation_id, row))
}

/// Appends a workflow-run row and returns its `workflow_log_id`.
pub async fn append_workflow_log(
    workbook: &dyn Workbook,
    record: &WorkflowLogRecord,
    now: DateTime<Utc>,
) -> Result<String, WriterError> {
    let workflow_log_id = id_or_generated(&record.workflow_id, "WF");
    let mut extra = vec![("workflow_log_id", Cell::text(workflow_log_id.clone()))];
    if record.execution_date.is_none() {
        extra.push(("execution_date", Cell::Timestamp(now)));
    }

    append_record(workbook, record, extra, now).await?;
    Ok(workflow_log_id)
}

pub async fn append_processing_log(
    workbook: &dyn Workbook,
    entry: &ProcessingLogEntry,
    now: DateTime<Utc>,
) -> Result<RowNumber, WriterError> {
    append_record(workbook, entry, Vec::new(), now).await
}

/// Appends a survey send event and returns its `send_id`.
pub async fn append_survey_send(
    workbook: &dyn Workbook,
    record: &SurveySendRecord,
    now: DateTime<Utc>,
) -> Result<String, WriterError> {
    let send_id = id_or_generated(&record.send_id, "SEND");
    let mut extra = vec![("send_id", Cell::text(send_id.clone()))];
    if record.send_time.is_none() {
        extra.push(("send_time", Cell::Timestamp(now)));
    }

    append_record(workbook, record, extra, now).await?;
    Ok(send_id)
}

/// Appends a survey response event and returns its `response_id`.
pub async fn append_survey_response(
    workbook: &dyn Workbook,
    record: &SurveyResponseRecord,
    now: DateTime<Utc>,
) -> Result<String, WriterError> {
    let response_id = id_or_generated(&record.response_id, "RESP");
    let mut extra = vec![("response_id", Cell::text(response_id.clone()))];
    if record.response_time.is_none() {
        extra.push(("response_time", Cell::Timestamp(now)));
    }

    append_record(workbook, record, extra, now).await?;
    Ok(response_id)
}
