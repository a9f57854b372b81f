//! The process-wide run progress record.
//!
//! One `RunState` lives in [`super::AppState`] behind a `std::sync::Mutex`:
//! the runner task is the only writer, any number of `/status` requests
//! snapshot it concurrently. The lock is never held across an await point.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::types::RunSnapshot;

/// Maximum retained run-log lines; the oldest are dropped first.
pub const LOG_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ready,
    Connecting,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    /// A run is in flight — new start requests must be rejected.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Connecting | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Ready => "ready",
            RunStatus::Connecting => "connecting",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct RunState {
    pub status: RunStatus,
    pub total: usize,
    pub processed: usize,
    pub clicked: usize,
    pub current_link: String,
    pub error: Option<String>,
    log: VecDeque<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Ready,
            total: 0,
            processed: 0,
            clicked: 0,
            current_link: String::new(),
            error: None,
            log: VecDeque::with_capacity(LOG_CAP),
        }
    }

    /// Append a timestamped line, dropping the oldest beyond [`LOG_CAP`].
    pub fn push_log(&mut self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message.as_ref()
        );
        while self.log.len() >= LOG_CAP {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Reset for a freshly accepted run. The log survives so pollers keep
    /// the history of previous runs.
    pub fn begin(&mut self, total: usize) {
        self.status = RunStatus::Connecting;
        self.total = total;
        self.processed = 0;
        self.clicked = 0;
        self.current_link.clear();
        self.error = None;
    }

    /// Terminal setup failure: `error` is set and the run is over.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = RunStatus::Error;
        self.current_link.clear();
        self.error = Some(message.into());
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            is_running: self.status.is_active(),
            total: self.total,
            processed: self.processed,
            clicked: self.clicked,
            current_link: self.current_link.clone(),
            logs: self.log.iter().cloned().collect(),
            error: self.error.clone(),
        }
    }
}
