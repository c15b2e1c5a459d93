//! Tabular store abstraction: named tables with a header row and 1-based
//! data rows, addressed by header name rather than by position.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;

pub mod cell;
pub mod memory;
pub mod postgres;

pub use cell::{Cell, parse_number, parse_timestamp};
pub use memory::MemoryWorkbook;
pub use postgres::PgWorkbook;

/// 1-based data row number (row 1 is the first row after the header).
pub type RowNumber = usize;

#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("row {row} is out of range for table {table}")]
    RowOutOfRange { table: String, row: RowNumber },
    #[error("column {column} is out of range for table {table}")]
    ColumnOutOfRange { table: String, column: usize },
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("workbook query failed: {0}")]
    Postgres(#[from] PgError),
}

pub type SharedWorkbook = Arc<dyn Workbook>;

/// Row/column store that every writer, rollup and analyzer works against.
#[async_trait]
pub trait Workbook: Send + Sync {
    /// Short backend label for logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Create `table` with `headers` if absent. An existing table keeps its
    /// columns and gains any header it is missing, appended at the end.
    async fn ensure_table(&self, table: &str, headers: &[&str]) -> Result<(), WorkbookError>;

    async fn headers(&self, table: &str) -> Result<Vec<String>, WorkbookError>;

    /// Header row plus every data row, in row order.
    async fn rows(&self, table: &str) -> Result<TableSnapshot, WorkbookError>;

    async fn append_row(&self, table: &str, cells: Vec<Cell>) -> Result<RowNumber, WorkbookError>;

    async fn update_row(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<Cell>,
    ) -> Result<(), WorkbookError>;

    /// Overwrite individual cells by 0-based column index.
    async fn set_cells(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<(usize, Cell)>,
    ) -> Result<(), WorkbookError>;

    async fn ping(&self) -> Result<(), WorkbookError>;
}

/// Point-in-time copy of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl TableSnapshot {
    pub fn layout(&self) -> HeaderIndex {
        HeaderIndex::new(&self.headers)
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == header)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row: RowNumber) -> Option<&[Cell]> {
        row.checked_sub(1)
            .and_then(|idx| self.rows.get(idx))
            .map(Vec::as_slice)
    }

    /// Data rows whose `column` matches `key`, with their row numbers, top to bottom.
    pub fn rows_with_key<'a, 'k>(
        &'a self,
        column: usize,
        key: &'k str,
    ) -> impl Iterator<Item = (RowNumber, &'a [Cell])> + use<'a, 'k> {
        self.rows.iter().enumerate().filter_map(move |(idx, cells)| {
            cell_at(cells, column)
                .matches_key(key)
                .then_some((idx + 1, cells.as_slice()))
        })
    }
}

/// Cell at `column`, treating short rows as padded with empties.
pub fn cell_at(cells: &[Cell], column: usize) -> &Cell {
    cells.get(column).unwrap_or(&EMPTY_CELL)
}

/// Header name → column position, resolved once per write.
#[derive(Debug, Clone)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
    width: usize,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            // first occurrence wins on duplicate headers
            positions.entry(header.trim().to_string()).or_insert(idx);
        }
        Self {
            positions,
            width: headers.len(),
        }
    }

    pub fn position(&self, header: &str) -> Option<usize> {
        self.positions.get(header).copied()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get<'a>(&self, cells: &'a [Cell], header: &str) -> &'a Cell {
        self.position(header)
            .map(|idx| cell_at(cells, idx))
            .unwrap_or(&EMPTY_CELL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TableSnapshot {
        TableSnapshot {
            name: "T".into(),
            headers: vec!["candidate_id".into(), "score".into()],
            rows: vec![
                vec![Cell::text("C1"), Cell::Number(1.0)],
                vec![Cell::text("C2")],
                vec![Cell::text("C1"), Cell::Number(3.0)],
            ],
        }
    }

    #[test]
    fn rows_with_key_reports_one_based_numbers() {
        let table = snapshot();
        let matches: Vec<RowNumber> = table.rows_with_key(0, "C1").map(|(row, _)| row).collect();
        assert_eq!(matches, vec![1, 3]);
    }

    #[test]
    fn short_rows_read_as_empty() {
        let table = snapshot();
        let layout = table.layout();
        let row = table.row(2).unwrap();
        assert_eq!(layout.get(row, "score"), &Cell::Empty);
        assert_eq!(layout.get(row, "unknown"), &Cell::Empty);
        assert!(table.row(0).is_none());
        assert!(table.row(4).is_none());
    }
}
