use serde::{Deserialize, Serialize};

use super::run_state::RunStatus;

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// Total unique links staged for the next run.
    pub count: usize,
    /// First few extracted links, for display.
    pub links: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Consistent point-in-time view of the run record, served by `/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub is_running: bool,
    pub total: usize,
    pub processed: usize,
    /// Items whose target control was actually found and clicked.
    #[serde(default)]
    pub clicked: usize,
    pub current_link: String,
    pub logs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}
