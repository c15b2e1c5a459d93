pub mod migrations;
pub mod pool;
pub mod util;

pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_from_url_checked};
