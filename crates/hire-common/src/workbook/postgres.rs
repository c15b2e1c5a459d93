use async_trait::async_trait;
use deadpool_postgres::GenericClient;
use tokio_postgres::types::Json;
use tracing::instrument;

use super::{Cell, RowNumber, TableSnapshot, Workbook, WorkbookError};
use crate::db::PgPool;
use crate::db::util::{timed_execute, timed_query, timed_query_opt};

/// Workbook persisted in `hire.workbook_tables` / `hire.workbook_rows`.
///
/// Each row is a JSONB array of tagged cells. Row numbers are allocated while
/// holding the owning table row lock, so concurrent appends never collide.
#[derive(Clone)]
pub struct PgWorkbook {
    pool: PgPool,
}

impl PgWorkbook {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_row(table: &str, row: RowNumber) -> Result<i32, WorkbookError> {
    i32::try_from(row)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| WorkbookError::RowOutOfRange {
            table: table.to_string(),
            row,
        })
}

async fn load_headers<C>(client: &C, table: &str, lock: bool) -> Result<Vec<String>, WorkbookError>
where
    C: GenericClient + Sync,
{
    let statement = if lock {
        "SELECT headers FROM hire.workbook_tables WHERE name = $1 FOR UPDATE"
    } else {
        "SELECT headers FROM hire.workbook_tables WHERE name = $1"
    };

    let row = timed_query_opt(client, statement, &[&table], "workbook.headers")
        .await?
        .ok_or_else(|| WorkbookError::TableNotFound(table.to_string()))?;
    let Json(headers) = row.try_get::<_, Json<Vec<String>>>("headers")?;
    Ok(headers)
}

#[async_trait]
impl Workbook for PgWorkbook {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, headers))]
    async fn ensure_table(&self, table: &str, headers: &[&str]) -> Result<(), WorkbookError> {
        let wanted: Vec<String> = headers.iter().map(|h| h.to_string()).collect();

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        timed_execute(
            &tx,
            "INSERT INTO hire.workbook_tables (name, headers) VALUES ($1, $2) \
             ON CONFLICT (name) DO NOTHING",
            &[&table, &Json(&wanted)],
            "workbook.ensure_table.insert",
        )
        .await?;

        let mut current = load_headers(&tx, table, true).await?;
        let before = current.len();
        for header in wanted {
            if !current.contains(&header) {
                current.push(header);
            }
        }

        if current.len() != before {
            timed_execute(
                &tx,
                "UPDATE hire.workbook_tables SET headers = $2 WHERE name = $1",
                &[&table, &Json(&current)],
                "workbook.ensure_table.extend",
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn headers(&self, table: &str) -> Result<Vec<String>, WorkbookError> {
        let client = self.pool.get().await?;
        load_headers(&client, table, false).await
    }

    #[instrument(skip(self))]
    async fn rows(&self, table: &str) -> Result<TableSnapshot, WorkbookError> {
        let client = self.pool.get().await?;
        let headers = load_headers(&client, table, false).await?;

        let records = timed_query(
            &client,
            "SELECT row_number, cells FROM hire.workbook_rows \
             WHERE table_name = $1 ORDER BY row_number",
            &[&table],
            "workbook.rows",
        )
        .await?;

        let mut rows: Vec<Vec<Cell>> = Vec::with_capacity(records.len());
        for record in records {
            let number: i32 = record.try_get("row_number")?;
            let Json(cells) = record.try_get::<_, Json<Vec<Cell>>>("cells")?;
            let idx = usize::try_from(number.max(1) - 1).unwrap_or_default();
            if rows.len() < idx {
                rows.resize(idx, Vec::new());
            }
            rows.push(cells);
        }

        Ok(TableSnapshot {
            name: table.to_string(),
            headers,
            rows,
        })
    }

    #[instrument(skip(self, cells))]
    async fn append_row(&self, table: &str, cells: Vec<Cell>) -> Result<RowNumber, WorkbookError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        load_headers(&tx, table, true).await?;

        let next = timed_query_opt(
            &tx,
            "INSERT INTO hire.workbook_rows (table_name, row_number, cells) \
             SELECT $1, COALESCE(MAX(row_number), 0) + 1, $2 \
             FROM hire.workbook_rows WHERE table_name = $1 \
             RETURNING row_number",
            &[&table, &Json(&cells)],
            "workbook.append_row",
        )
        .await?
        .map(|row| row.try_get::<_, i32>("row_number"))
        .transpose()?
        .unwrap_or(1);

        tx.commit().await?;
        Ok(usize::try_from(next).unwrap_or_default())
    }

    #[instrument(skip(self, cells))]
    async fn update_row(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<Cell>,
    ) -> Result<(), WorkbookError> {
        let number = db_row(table, row)?;
        let client = self.pool.get().await?;

        let updated = timed_execute(
            &client,
            "UPDATE hire.workbook_rows SET cells = $3, updated_at = NOW() \
             WHERE table_name = $1 AND row_number = $2",
            &[&table, &number, &Json(&cells)],
            "workbook.update_row",
        )
        .await?;

        if updated == 0 {
            load_headers(&client, table, false).await?;
            return Err(WorkbookError::RowOutOfRange {
                table: table.to_string(),
                row,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, cells))]
    async fn set_cells(
        &self,
        table: &str,
        row: RowNumber,
        cells: Vec<(usize, Cell)>,
    ) -> Result<(), WorkbookError> {
        let number = db_row(table, row)?;
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let width = load_headers(&tx, table, false).await?.len();
        if let Some((column, _)) = cells.iter().find(|(column, _)| *column >= width) {
            return Err(WorkbookError::ColumnOutOfRange {
                table: table.to_string(),
                column: *column,
            });
        }

        let record = timed_query_opt(
            &tx,
            "SELECT cells FROM hire.workbook_rows \
             WHERE table_name = $1 AND row_number = $2 FOR UPDATE",
            &[&table, &number],
            "workbook.set_cells.load",
        )
        .await?
        .ok_or_else(|| WorkbookError::RowOutOfRange {
            table: table.to_string(),
            row,
        })?;

        let Json(mut existing) = record.try_get::<_, Json<Vec<Cell>>>("cells")?;
        for (column, cell) in cells {
            if existing.len() <= column {
                existing.resize(column + 1, Cell::Empty);
            }
            existing[column] = cell;
        }

        timed_execute(
            &tx,
            "UPDATE hire.workbook_rows SET cells = $3, updated_at = NOW() \
             WHERE table_name = $1 AND row_number = $2",
            &[&table, &number, &Json(&existing)],
            "workbook.set_cells.store",
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), WorkbookError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}
