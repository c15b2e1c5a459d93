//! Recompute "latest" fields on the score snapshot and candidate master rows
//! by scanning the append-only logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::schema::{
    CANDIDATE_ID, CANDIDATE_SCORES, CANDIDATES_MASTER, ENGAGEMENT_LOG, EVALUATION_MASTER,
    LAST_UPDATED_AT,
};
use crate::workbook::{Cell, HeaderIndex, RowNumber, TableSnapshot, Workbook, WorkbookError, cell_at};
use crate::writers::set_row_values;

/// Result of one rollup. `success == false` is a soft miss (nothing to roll
/// up), not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl RollupOutcome {
    fn soft_miss(message: impl Into<String>) -> Self {
        let message = message.into();
        info!(%message, "rollup soft miss");
        Self {
            success: false,
            message,
            updated: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn applied(row: RowNumber, written: &[(&'static str, Cell)], skipped: Vec<&'static str>) -> Self {
        let updated = written
            .iter()
            .map(|(header, _)| *header)
            .filter(|header| !skipped.contains(header))
            .map(str::to_string)
            .collect();
        Self {
            success: true,
            message: format!("updated row {row}"),
            updated,
            skipped: skipped.into_iter().map(str::to_string).collect(),
        }
    }
}

/// The most recent row for a key.
#[derive(Debug, Clone, Copy)]
pub struct LatestRow<'a> {
    pub row: RowNumber,
    pub cells: &'a [Cell],
    pub at: DateTime<Utc>,
}

/// Latest row for `key`, timed by the first parseable of `time_headers`.
///
/// Rows without a parseable time are never "latest". On equal times the row
/// inserted last (highest row number) wins.
pub fn latest_row<'a>(
    snapshot: &'a TableSnapshot,
    key: &str,
    time_headers: &[&str],
) -> Option<LatestRow<'a>> {
    let layout = snapshot.layout();
    let key_column = layout.position(CANDIDATE_ID)?;
    let time_columns: Vec<usize> = time_headers
        .iter()
        .filter_map(|header| layout.position(header))
        .collect();

    let mut best: Option<LatestRow<'a>> = None;
    for (row, cells) in snapshot.rows_with_key(key_column, key) {
        let Some(at) = time_columns
            .iter()
            .find_map(|column| cell_at(cells, *column).as_timestamp())
        else {
            continue;
        };
        if best.is_none_or(|current| at >= current.at) {
            best = Some(LatestRow { row, cells, at });
        }
    }
    best
}

/// Last row (highest row number) carrying `key`.
fn last_row_for<'a>(snapshot: &'a TableSnapshot, key: &str) -> Option<(RowNumber, &'a [Cell])> {
    let key_column = snapshot.column(CANDIDATE_ID)?;
    snapshot.rows_with_key(key_column, key).last()
}

fn first_row_for<'a>(snapshot: &'a TableSnapshot, key: &str) -> Option<(RowNumber, &'a [Cell])> {
    let key_column = snapshot.column(CANDIDATE_ID)?;
    snapshot.rows_with_key(key_column, key).next()
}

fn copy_if_present(
    values: &mut Vec<(&'static str, Cell)>,
    target: &'static str,
    source: &Cell,
    numeric: bool,
) {
    if source.is_empty() {
        return;
    }
    let cell = if numeric {
        match source.as_f64() {
            Some(value) => Cell::Number(value),
            None => return,
        }
    } else {
        source.clone()
    };
    values.push((target, cell));
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Write `latest` and, when it differs from the stored value, move the old
/// value to `previous` and record `delta = new - old`.
fn shift_probability(
    values: &mut Vec<(&'static str, Cell)>,
    master: &HeaderIndex,
    current: &[Cell],
    latest: &'static str,
    previous: &'static str,
    delta: &'static str,
    new_value: Option<f64>,
) {
    let Some(new_value) = new_value else {
        return;
    };

    if let Some(old) = master.get(current, latest).as_f64() {
        if (old - new_value).abs() > f64::EPSILON {
            values.push((previous, Cell::Number(old)));
            values.push((delta, Cell::Number(round2(new_value - old))));
        }
    }
    values.push((latest, Cell::Number(new_value)));
}

/// Copy the latest engagement values into the candidate's score snapshot row.
#[instrument(skip(workbook, now))]
pub async fn update_candidate_scores(
    workbook: &dyn Workbook,
    candidate_id: &str,
    now: DateTime<Utc>,
) -> Result<RollupOutcome, WorkbookError> {
    let engagement = workbook.rows(ENGAGEMENT_LOG).await?;
    let Some(latest) = latest_row(&engagement, candidate_id, &["timestamp"]) else {
        return Ok(RollupOutcome::soft_miss(format!(
            "no engagement rows for {candidate_id}"
        )));
    };

    let scores = workbook.rows(CANDIDATE_SCORES).await?;
    let Some((target_row, _)) = last_row_for(&scores, candidate_id) else {
        return Ok(RollupOutcome::soft_miss(format!(
            "no score snapshot row for {candidate_id}"
        )));
    };

    let source = engagement.layout();
    let cells = latest.cells;
    let mut values = Vec::new();
    copy_if_present(&mut values, "latest_acceptance_ai", source.get(cells, "acceptance_rate_ai"), true);
    copy_if_present(
        &mut values,
        "latest_acceptance_final",
        source.get(cells, "acceptance_rate_final"),
        true,
    );
    copy_if_present(&mut values, "confidence_level", source.get(cells, "confidence_level"), false);
    copy_if_present(&mut values, "motivation_score", source.get(cells, "motivation_score"), true);
    copy_if_present(
        &mut values,
        "competitive_advantage_score",
        source.get(cells, "competitive_advantage_score"),
        true,
    );
    copy_if_present(
        &mut values,
        "concern_resolution_score",
        source.get(cells, "concern_resolution_score"),
        true,
    );
    values.push((LAST_UPDATED_AT, Cell::Timestamp(now)));

    let skipped = set_row_values(workbook, CANDIDATE_SCORES, target_row, values.clone()).await?;
    Ok(RollupOutcome::applied(target_row, &values, skipped))
}

/// Recompute the master row's latest evaluation and acceptance fields.
#[instrument(skip(workbook, now))]
pub async fn update_candidates_master(
    workbook: &dyn Workbook,
    candidate_id: &str,
    now: DateTime<Utc>,
) -> Result<RollupOutcome, WorkbookError> {
    let master = workbook.rows(CANDIDATES_MASTER).await?;
    let Some((master_row, current)) = first_row_for(&master, candidate_id) else {
        return Ok(RollupOutcome::soft_miss(format!(
            "no master row for {candidate_id}"
        )));
    };
    let master_layout = master.layout();

    let evaluations = workbook.rows(EVALUATION_MASTER).await?;
    let interview_count = evaluations
        .column(CANDIDATE_ID)
        .map(|column| evaluations.rows_with_key(column, candidate_id).count())
        .unwrap_or(0);
    let latest_evaluation = latest_row(&evaluations, candidate_id, &["interview_datetime", "created_at"]);

    let scores = workbook.rows(CANDIDATE_SCORES).await?;
    let latest_scores = latest_row(&scores, candidate_id, &[LAST_UPDATED_AT]);

    if latest_evaluation.is_none() && latest_scores.is_none() && interview_count == 0 {
        return Ok(RollupOutcome::soft_miss(format!(
            "no evaluation or score rows for {candidate_id}"
        )));
    }

    let mut values = Vec::new();

    if let Some(evaluation) = latest_evaluation {
        let source = evaluations.layout();
        let cells = evaluation.cells;
        copy_if_present(&mut values, "latest_rank", source.get(cells, "total_rank"), false);
        copy_if_present(&mut values, "latest_total_score", source.get(cells, "total_score"), true);
        values.push(("latest_interview_date", Cell::Timestamp(evaluation.at)));
        copy_if_present(&mut values, "latest_philosophy", source.get(cells, "philosophy_score"), true);
        copy_if_present(&mut values, "latest_strategy", source.get(cells, "strategy_score"), true);
        copy_if_present(&mut values, "latest_motivation", source.get(cells, "motivation_score"), true);
        copy_if_present(&mut values, "latest_execution", source.get(cells, "execution_score"), true);
        shift_probability(
            &mut values,
            &master_layout,
            current,
            "latest_pass_probability",
            "previous_pass_probability",
            "pass_probability_delta",
            source.get(cells, "pass_probability").as_f64(),
        );
    }

    if let Some(snapshot) = latest_scores {
        let source = scores.layout();
        let cells = snapshot.cells;
        copy_if_present(&mut values, "latest_acceptance_ai", source.get(cells, "latest_acceptance_ai"), true);
        shift_probability(
            &mut values,
            &master_layout,
            current,
            "latest_acceptance_final",
            "previous_acceptance",
            "acceptance_delta",
            source.get(cells, "latest_acceptance_final").as_f64(),
        );
    }

    values.push(("interview_count", Cell::Number(interview_count as f64)));
    values.push((LAST_UPDATED_AT, Cell::Timestamp(now)));

    let skipped = set_row_values(workbook, CANDIDATES_MASTER, master_row, values.clone()).await?;
    Ok(RollupOutcome::applied(master_row, &values, skipped))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::records::{CandidateRecord, EngagementRecord, EvaluationRecord, ScoreSnapshotRecord};
    use crate::schema::bootstrap_workbook;
    use crate::workbook::MemoryWorkbook;
    use crate::writers::{append_engagement, append_evaluation, append_score_snapshot, write_candidate};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    async fn seeded() -> MemoryWorkbook {
        let wb = MemoryWorkbook::new();
        bootstrap_workbook(&wb).await.unwrap();
        let candidate = CandidateRecord {
            candidate_id: "C-1".into(),
            name: Some("Ann".into()),
            ..Default::default()
        };
        write_candidate(&wb, &candidate, at(1, 0)).await.unwrap();
        wb
    }

    fn evaluation(rank: &str, when: &str, pass: f64) -> EvaluationRecord {
        EvaluationRecord {
            candidate_id: "C-1".into(),
            total_rank: Some(rank.into()),
            total_score: Some(70.0),
            interview_datetime: Some(when.into()),
            pass_probability: Some(pass),
            ..Default::default()
        }
    }

    async fn master_cell(wb: &MemoryWorkbook, header: &str) -> Cell {
        let snapshot = wb.rows(CANDIDATES_MASTER).await.unwrap();
        snapshot.layout().get(snapshot.row(1).unwrap(), header).clone()
    }

    #[tokio::test]
    async fn latest_evaluation_wins_regardless_of_insertion_order() {
        let wb = seeded().await;
        // inserted T3, T1, T2
        append_evaluation(&wb, &evaluation("A", "2024-06-03T10:00:00Z", 80.0), at(5, 0)).await.unwrap();
        append_evaluation(&wb, &evaluation("C", "2024-06-01T10:00:00Z", 40.0), at(5, 1)).await.unwrap();
        append_evaluation(&wb, &evaluation("B", "2024-06-02T10:00:00Z", 60.0), at(5, 2)).await.unwrap();

        let outcome = update_candidates_master(&wb, "C-1", at(6, 0)).await.unwrap();
        assert!(outcome.success);

        assert_eq!(master_cell(&wb, "latest_rank").await, Cell::text("A"));
        assert_eq!(master_cell(&wb, "latest_pass_probability").await, Cell::Number(80.0));
        assert_eq!(master_cell(&wb, "interview_count").await, Cell::Number(3.0));
        assert_eq!(
            master_cell(&wb, "latest_interview_date").await,
            Cell::Timestamp(at(3, 10))
        );
    }

    #[tokio::test]
    async fn ties_go_to_the_last_inserted_row() {
        let wb = seeded().await;
        append_evaluation(&wb, &evaluation("B", "2024-06-02T10:00:00Z", 60.0), at(5, 0)).await.unwrap();
        append_evaluation(&wb, &evaluation("D", "2024-06-02T10:00:00Z", 30.0), at(5, 1)).await.unwrap();

        update_candidates_master(&wb, "C-1", at(6, 0)).await.unwrap();
        assert_eq!(master_cell(&wb, "latest_rank").await, Cell::text("D"));
    }

    #[tokio::test]
    async fn changed_probability_shifts_previous_and_delta() {
        let wb = seeded().await;
        append_evaluation(&wb, &evaluation("B", "2024-06-01T10:00:00Z", 60.0), at(5, 0)).await.unwrap();
        update_candidates_master(&wb, "C-1", at(5, 1)).await.unwrap();
        assert_eq!(master_cell(&wb, "previous_pass_probability").await, Cell::Empty);

        append_evaluation(&wb, &evaluation("A", "2024-06-02T10:00:00Z", 75.0), at(5, 2)).await.unwrap();
        update_candidates_master(&wb, "C-1", at(5, 3)).await.unwrap();
        assert_eq!(master_cell(&wb, "previous_pass_probability").await, Cell::Number(60.0));
        assert_eq!(master_cell(&wb, "pass_probability_delta").await, Cell::Number(15.0));

        // same value again leaves the history alone
        update_candidates_master(&wb, "C-1", at(5, 4)).await.unwrap();
        assert_eq!(master_cell(&wb, "previous_pass_probability").await, Cell::Number(60.0));
    }

    #[tokio::test]
    async fn unparseable_times_are_counted_but_never_latest() {
        let wb = seeded().await;
        append_evaluation(&wb, &evaluation("B", "2024-06-01T10:00:00Z", 60.0), at(5, 0)).await.unwrap();
        append_evaluation(&wb, &evaluation("E", "sometime", 10.0), at(5, 1)).await.unwrap();

        update_candidates_master(&wb, "C-1", at(6, 0)).await.unwrap();
        // "sometime" falls back to created_at, which is later, so E wins here;
        // a row with neither time parseable would be skipped entirely.
        assert_eq!(master_cell(&wb, "interview_count").await, Cell::Number(2.0));
        assert_eq!(master_cell(&wb, "latest_rank").await, Cell::text("E"));
    }

    #[test]
    fn latest_row_skips_rows_without_any_time() {
        let snapshot = TableSnapshot {
            name: "T".into(),
            headers: vec!["candidate_id".into(), "timestamp".into(), "v".into()],
            rows: vec![
                vec![Cell::text("C-1"), Cell::text("2024-06-01 09:00:00"), Cell::text("old")],
                vec![Cell::text("C-1"), Cell::text("garbage"), Cell::text("bad")],
                vec![Cell::text("C-2"), Cell::text("2024-06-09 09:00:00"), Cell::text("other")],
            ],
        };
        let latest = latest_row(&snapshot, "C-1", &["timestamp"]).unwrap();
        assert_eq!(latest.row, 1);
        assert!(latest_row(&snapshot, "C-3", &["timestamp"]).is_none());
    }

    #[tokio::test]
    async fn score_rollup_soft_misses_without_engagement() {
        let wb = seeded().await;
        let outcome = update_candidate_scores(&wb, "C-1", at(6, 0)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("no engagement rows"));
    }

    #[tokio::test]
    async fn score_rollup_copies_latest_engagement_into_last_snapshot() {
        let wb = seeded().await;
        let snapshot = ScoreSnapshotRecord {
            candidate_id: "C-1".into(),
            ..Default::default()
        };
        append_score_snapshot(&wb, &snapshot, at(2, 0)).await.unwrap();
        append_score_snapshot(&wb, &snapshot, at(2, 1)).await.unwrap();

        let older = EngagementRecord {
            candidate_id: "C-1".into(),
            timestamp: Some("2024-06-02T00:00:00Z".into()),
            acceptance_rate_ai: Some(40.0),
            ..Default::default()
        };
        let newer = EngagementRecord {
            timestamp: Some("2024-06-03T00:00:00Z".into()),
            acceptance_rate_ai: Some(65.0),
            acceptance_rate_final: Some(70.0),
            confidence_level: Some("HIGH".into()),
            ..older.clone()
        };
        append_engagement(&wb, &newer, at(3, 0)).await.unwrap();
        append_engagement(&wb, &older, at(3, 1)).await.unwrap();

        let outcome = update_candidate_scores(&wb, "C-1", at(4, 0)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.updated.contains(&"latest_acceptance_ai".to_string()));

        let scores = wb.rows(CANDIDATE_SCORES).await.unwrap();
        let layout = scores.layout();
        let last = scores.row(2).unwrap();
        assert_eq!(layout.get(last, "latest_acceptance_ai"), &Cell::Number(65.0));
        assert_eq!(layout.get(last, "latest_acceptance_final"), &Cell::Number(70.0));
        assert_eq!(layout.get(last, "confidence_level"), &Cell::text("高"));
        // first snapshot row untouched
        assert_eq!(layout.get(scores.row(1).unwrap(), "latest_acceptance_ai"), &Cell::Empty);

        let master = update_candidates_master(&wb, "C-1", at(4, 1)).await.unwrap();
        assert!(master.success);
        assert_eq!(master_cell(&wb, "latest_acceptance_final").await, Cell::Number(70.0));
    }

    #[tokio::test]
    async fn master_rollup_soft_misses_for_unknown_candidate() {
        let wb = seeded().await;
        let outcome = update_candidates_master(&wb, "C-404", at(6, 0)).await.unwrap();
        assert!(!outcome.success);
    }
}
