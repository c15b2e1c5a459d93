//! Identifier generation for log rows and evaluation records.
//!
//! Row identifiers are ULID based so they sort by creation time. Each
//! process also carries a run id that is stamped into processing-log rows,
//! which makes it possible to tell apart rows written by different
//! deployments on the same day.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use ulid::Ulid;

/// Process-level run ID, generated once at first access.
static RUN_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the process-level run ID.
#[inline]
pub fn run_id() -> &'static str {
    &RUN_ID
}

/// Generates a fresh ULID.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}

/// `<prefix>_<ULID>`, e.g. `LOG_01HV...`.
pub fn prefixed(prefix: &str) -> String {
    format!("{prefix}_{}", generate())
}

pub const EVALUATION_ID_PREFIX: &str = "EVAL_";

/// 評価IDの日付部分 (`EVAL_YYYYMMDD_`)。当日分の件数カウントにも使う。
pub fn evaluation_id_day_prefix(date: NaiveDate) -> String {
    format!("{EVALUATION_ID_PREFIX}{}_", date.format("%Y%m%d"))
}

/// `EVAL_YYYYMMDD_NNN`, where NNN is one more than the number of evaluations
/// already issued that business day.
pub fn evaluation_id(date: NaiveDate, issued_today: usize) -> String {
    format!("{}{:03}", evaluation_id_day_prefix(date), issued_today + 1)
}
