//! Table names and canonical header rows for every workbook table.

use tracing::{info, instrument};

use crate::workbook::{Workbook, WorkbookError};

pub const CANDIDATES_MASTER: &str = "Candidates_Master";
pub const CANDIDATE_SCORES: &str = "Candidate_Scores";
pub const CANDIDATE_INSIGHTS: &str = "Candidate_Insights";
pub const ENGAGEMENT_LOG: &str = "Engagement_Log";
pub const EVALUATION_MASTER: &str = "Evaluation_Master";
pub const WORKFLOW_LOG: &str = "Workflow_Log";
pub const PROCESSING_LOG: &str = "Processing_Log";
pub const SURVEY_SEND_LOG: &str = "Survey_Send_Log";
pub const SURVEY_RESPONSE: &str = "Survey_Response";
pub const ARCHIVE: &str = "Archive";

/// Stamped with the write time by every upsert and rollup.
pub const LAST_UPDATED_AT: &str = "last_updated_at";
pub const CANDIDATE_ID: &str = "candidate_id";

pub const CANDIDATES_MASTER_HEADERS: &[&str] = &[
    "candidate_id",
    "name",
    "status",
    "category",
    "email",
    "interviewer",
    "applied_at",
    "latest_pass_probability",
    "previous_pass_probability",
    "pass_probability_delta",
    "latest_acceptance_ai",
    "latest_acceptance_human",
    "latest_acceptance_final",
    "previous_acceptance",
    "acceptance_delta",
    "latest_philosophy",
    "latest_strategy",
    "latest_motivation",
    "latest_execution",
    "latest_total_score",
    "latest_rank",
    "latest_interview_date",
    "interview_count",
    "engagement_score",
    "urgency_score",
    "core_motivation",
    "top_concern",
    "next_action",
    "action_deadline",
    "action_priority",
    "last_updated_at",
];

pub const CANDIDATE_SCORES_HEADERS: &[&str] = &[
    "candidate_id",
    "name",
    "latest_philosophy",
    "latest_strategy",
    "latest_motivation",
    "latest_execution",
    "latest_total_score",
    "latest_acceptance_ai",
    "latest_acceptance_final",
    "confidence_level",
    "motivation_score",
    "competitive_advantage_score",
    "concern_resolution_score",
    "last_updated_at",
];

pub const CANDIDATE_INSIGHTS_HEADERS: &[&str] = &[
    "candidate_id",
    "name",
    "core_motivation",
    "top_concern",
    "competitor_1",
    "competitor_2",
    "competitor_3",
    "next_action",
    "last_updated_at",
];

pub const ENGAGEMENT_LOG_HEADERS: &[&str] = &[
    "log_id",
    "candidate_id",
    "candidate_name",
    "timestamp",
    "contact_type",
    "acceptance_rate_rule",
    "acceptance_rate_ai",
    "acceptance_rate_final",
    "confidence_level",
    "motivation_score",
    "competitive_advantage_score",
    "concern_resolution_score",
    "core_motivation",
    "top_concern",
    "concern_category",
    "competitors",
    "competitive_advantage",
    "next_action",
    "action_deadline",
    "action_priority",
    "action_status",
    "notes",
];

pub const EVALUATION_MASTER_HEADERS: &[&str] = &[
    "evaluation_id",
    "interview_datetime",
    "candidate_id",
    "candidate_name",
    "recruit_type",
    "selection_phase",
    "philosophy_rank",
    "philosophy_score",
    "philosophy_reason",
    "strategy_rank",
    "strategy_score",
    "strategy_reason",
    "motivation_rank",
    "motivation_score",
    "motivation_reason",
    "execution_rank",
    "execution_score",
    "execution_reason",
    "total_score",
    "total_rank",
    "pass_probability",
    "recommendation",
    "summary",
    "transcript",
    "interview_memo",
    "concerns",
    "next_check_points",
    "next_question_1",
    "next_question_2",
    "next_question_3",
    "next_question_4",
    "next_question_5",
    "competitor_analysis",
    "evaluation_report_url",
    "strategy_report_url",
    "workflow_id",
    "created_at",
];

pub const WORKFLOW_LOG_HEADERS: &[&str] = &[
    "workflow_log_id",
    "workflow_name",
    "candidate_id",
    "execution_date",
    "status",
    "duration_seconds",
    "input_summary",
    "output_summary",
    "error_message",
];

pub const PROCESSING_LOG_HEADERS: &[&str] = &[
    "timestamp",
    "phase",
    "candidate",
    "event",
    "status",
    "detail",
    "error",
    "notes",
    "run_id",
];

pub const SURVEY_SEND_LOG_HEADERS: &[&str] = &[
    "send_id",
    "candidate_id",
    "candidate_name",
    "email",
    "phase",
    "send_time",
    "send_status",
    "error_message",
];

pub const SURVEY_RESPONSE_HEADERS: &[&str] = &[
    "response_id",
    "candidate_id",
    "candidate_name",
    "phase",
    "response_time",
    "aspiration",
    "concerns",
    "other_companies",
    "comments",
];

pub const ARCHIVE_HEADERS: &[&str] = &[
    "candidate_id",
    "name",
    "category",
    "accepted_at",
    "final_pass_probability",
    "final_acceptance_probability",
    "final_rank",
    "interview_count",
    "archived_at",
];

/// Every table the service owns, with its canonical header row.
pub const DEFAULT_TABLES: &[(&str, &[&str])] = &[
    (CANDIDATES_MASTER, CANDIDATES_MASTER_HEADERS),
    (CANDIDATE_SCORES, CANDIDATE_SCORES_HEADERS),
    (CANDIDATE_INSIGHTS, CANDIDATE_INSIGHTS_HEADERS),
    (ENGAGEMENT_LOG, ENGAGEMENT_LOG_HEADERS),
    (EVALUATION_MASTER, EVALUATION_MASTER_HEADERS),
    (WORKFLOW_LOG, WORKFLOW_LOG_HEADERS),
    (PROCESSING_LOG, PROCESSING_LOG_HEADERS),
    (SURVEY_SEND_LOG, SURVEY_SEND_LOG_HEADERS),
    (SURVEY_RESPONSE, SURVEY_RESPONSE_HEADERS),
    (ARCHIVE, ARCHIVE_HEADERS),
];

/// Create every default table that does not exist yet. Existing tables keep
/// their column order and only gain missing headers.
#[instrument(skip(workbook), fields(backend = workbook.backend()))]
pub async fn bootstrap_workbook(workbook: &dyn Workbook) -> Result<(), WorkbookError> {
    for (table, headers) in DEFAULT_TABLES {
        workbook.ensure_table(table, headers).await?;
    }
    info!(tables = DEFAULT_TABLES.len(), "workbook bootstrapped");
    Ok(())
}
