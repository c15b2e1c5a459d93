use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime,
};
use thiserror::Error;
use tokio_postgres::NoTls;

pub type PgPool = Pool;

const CONNECT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
    #[error("database is unreachable: {0}")]
    Unreachable(#[from] PoolError),
    #[error("timed out connecting to database")]
    ConnectTimeout,
}

pub fn create_pool_from_url(db_url: &str) -> Result<PgPool, DbPoolError> {
    let _ = tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(DbPoolError::PoolCreation)
}

/// Build the pool and check out one connection so startup fails fast on a bad URL.
pub async fn create_pool_from_url_checked(db_url: &str) -> Result<PgPool, DbPoolError> {
    let pool = create_pool_from_url(db_url)?;
    let client = tokio::time::timeout(CONNECT_CHECK_TIMEOUT, pool.get())
        .await
        .map_err(|_| DbPoolError::ConnectTimeout)??;
    drop(client);
    Ok(pool)
}
