use std::{sync::OnceLock, time::Instant};

use deadpool_postgres::GenericClient;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::warn;

pub const SLOW_QUERY_ENV: &str = "HIRE_DB_LOG_MIN_DURATION_MS";

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

fn slow_query_threshold_ms() -> Option<u64> {
    static CACHE: OnceLock<Option<u64>> = OnceLock::new();

    *CACHE.get_or_init(|| {
        std::env::var(SLOW_QUERY_ENV)
            .ok()
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|v| v.max(0) as u64)
            .filter(|v| *v > 0)
    })
}

fn maybe_log_slow_query(label: &str, started_at: Instant) {
    if let Some(threshold_ms) = slow_query_threshold_ms() {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if elapsed_ms >= threshold_ms {
            warn!(query = label, elapsed_ms, "slow_query_detected");
        }
    }
}

/// `query` through the statement cache, logging when slower than `HIRE_DB_LOG_MIN_DURATION_MS`.
pub async fn timed_query<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<Vec<Row>, tokio_postgres::Error>
where
    C: GenericClient + Sync + ?Sized,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn timed_query_opt<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<Option<Row>, tokio_postgres::Error>
where
    C: GenericClient + Sync + ?Sized,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.query_opt(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}

pub async fn timed_execute<C>(
    client: &C,
    statement: &str,
    params: Params<'_>,
    label: &str,
) -> Result<u64, tokio_postgres::Error>
where
    C: GenericClient + Sync + ?Sized,
{
    let started = Instant::now();
    let prepared = client.prepare_cached(statement).await?;
    let result = client.execute(&prepared, params).await;
    maybe_log_slow_query(label, started);
    result
}
