use serde_json::{Map, Value};
use tracing::instrument;

use crate::schema::WORKFLOW_LOG;
use crate::workbook::{Workbook, WorkbookError, cell_at};

pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_RECENT_LIMIT: usize = 100;

/// Last `limit` workflow-log rows (oldest first), each keyed by header.
#[instrument(skip(workbook))]
pub async fn recent_workflow_logs(
    workbook: &dyn Workbook,
    limit: usize,
) -> Result<Vec<Map<String, Value>>, WorkbookError> {
    let limit = limit.clamp(1, MAX_RECENT_LIMIT);
    let snapshot = workbook.rows(WORKFLOW_LOG).await?;
    let start = snapshot.rows.len().saturating_sub(limit);

    Ok(snapshot.rows[start..]
        .iter()
        .map(|cells| {
            snapshot
                .headers
                .iter()
                .enumerate()
                .filter(|(_, header)| !header.trim().is_empty())
                .map(|(idx, header)| (header.trim().to_string(), cell_at(cells, idx).to_json()))
                .collect()
        })
        .collect())
}
