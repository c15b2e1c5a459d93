pub mod behavior;
pub mod db;
pub mod ids;
pub mod locks;
pub mod logging;
pub mod payload;
pub mod pipeline;
pub mod records;
pub mod report;
pub mod response_speed;
pub mod rollup;
pub mod schema;
pub mod survey;
pub mod timezone;
pub mod workbook;
pub mod workflow_logs;
pub mod writers;

pub use pipeline::{IngestionService, IngestionSettings};
pub use workbook::{Cell, MemoryWorkbook, PgWorkbook, SharedWorkbook, Workbook, WorkbookError};
