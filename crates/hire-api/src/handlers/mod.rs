pub mod candidates;
pub mod health;
pub mod surveys;
pub mod webhook;
pub mod workflow_logs;
