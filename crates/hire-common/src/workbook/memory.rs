use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Cell, RowNumber, TableSnapshot, Workbook, WorkbookError};
use crate::schema::DEFAULT_TABLES;

/// In-process workbook used for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryWorkbook {
    tables: RwLock<HashMap<String, TableSnapshot>>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table with explicit headers, replacing any existing one.
    pub fn with_table(self, name: &str, headers: &[&str]) -> Self {
        self.tables.write().insert(
            name.to_string(),
            TableSnapshot {
                name: name.to_string(),
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Workbook pre-populated with every table from [`DEFAULT_TABLES`], empty.
    pub fn with_default_tables() -> Self {
        DEFAULT_TABLES
            .iter()
            .fold(Self::new(), |wb, (name, headers)| wb.with_table(name, headers))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn row_index(table: &TableSnapshot, row: RowNumber) -> Result<usize, WorkbookError> {
    row.checked_sub(1)
        .filter(|idx| *idx < table.rows.len())
        .ok_or_else(|| WorkbookError::RowOutOfRange {
            table: table.name.clone(),
            row,
        })
}

#[async_trait]
impl Workbook for MemoryWorkbook {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_table(&self, table: &str, headers: &[&str]) -> Result<(), WorkbookError> {
        let mut tables = self.tables.write();
        let entry = tables
            .entry(table.to_string())
            .or_insert_with(|| TableSnapshot {
                name: table.to_string(),
                headers: Vec::new(),
                rows: Vec::new(),
            });

        for header in headers {
            if !entry.headers.iter().any(|existing| existing == header) {
                entry.headers.push(header.to_string());
            }
        }
        Ok(())
    }

    async fn headers(&self, table: &str) -> Result<Vec<String>, WorkbookError> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.headers.clone())
            .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))
    }

    async fn rows(&self, table: &str) -> Result<TableSnapshot, WorkbookError> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))
    }

    async fn append_row(&self, table: &str, cells: Vec<Cell>) -> Result<RowNumber, WorkbookError> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))?;
        target.rows.push(cells);
        Ok(target.rows.len())
    }

    async fn update_row(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<Cell>,
    ) -> Result<(), WorkbookError> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))?;
        let idx = row_index(target, row)?;
        target.rows[idx] = cells;
        Ok(())
    }

    async fn set_cells(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<(usize, Cell)>,
    ) -> Result<(), WorkbookError> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))?;
        let idx = row_index(target, row)?;
        let width = target.headers.len();

        if let Some((column, _)) = cells.iter().find(|(column, _)| *column >= width) {
            return Err(WorkbookError::ColumnOutOfRange {
                table: table.to_string(),
                column: *column,
            });
        }

        let existing = &mut target.rows[idx];
        for (column, cell) in cells {
            if existing.len() <= column {
                existing.resize(column + 1, Cell::Empty);
            }
            existing[column] = cell;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), WorkbookError> {
        Ok(())
    }
}
