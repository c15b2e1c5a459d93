use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "workbook tables and rows",
        sql: r#"
CREATE TABLE IF NOT EXISTS hire.workbook_tables (
    name TEXT PRIMARY KEY,
    headers JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS hire.workbook_rows (
    table_name TEXT NOT NULL REFERENCES hire.workbook_tables(name) ON DELETE CASCADE,
    row_number INTEGER NOT NULL,
    cells JSONB NOT NULL DEFAULT '[]'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (table_name, row_number),
    CONSTRAINT chk_row_number_positive CHECK (row_number >= 1)
);
"#,
    },
    Migration {
        id: 2,
        description: "headers must be a json array",
        sql: r#"
DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'chk_workbook_headers_array'
    ) THEN
        ALTER TABLE hire.workbook_tables
            ADD CONSTRAINT chk_workbook_headers_array
            CHECK (jsonb_typeof(headers) = 'array');
    END IF;
END $$;
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS hire;
             CREATE TABLE IF NOT EXISTS hire.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM hire.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO hire.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
