use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::config::PilotConfig;
use super::run_state::RunState;
use crate::runner::RunHandle;

/// Shared application context, threaded through every handler and the runner
/// instead of ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// The single process-wide run record. Written by the runner task only,
    /// snapshotted by `/status`.
    pub run_state: Arc<Mutex<RunState>>,
    /// Links staged by `/analyze`, consumed (copied) by `/start`.
    pub pending_links: Arc<Mutex<Vec<String>>>,
    /// Cooperative cancellation, observed by the runner between items.
    pub stop_flag: Arc<AtomicBool>,
    pub config: Arc<PilotConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("status", &self.run_state.lock().unwrap().status)
            .field("pending_links", &self.pending_links.lock().unwrap().len())
            .finish()
    }
}

impl AppState {
    pub fn new(config: PilotConfig) -> Self {
        Self {
            run_state: Arc::new(Mutex::new(RunState::new())),
            pending_links: Arc::new(Mutex::new(Vec::new())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        }
    }

    /// The slice of state the runner task needs.
    pub fn run_handle(&self) -> RunHandle {
        RunHandle {
            state: Arc::clone(&self.run_state),
            stop: Arc::clone(&self.stop_flag),
        }
    }

    /// Replace the staged link set.
    pub fn stage_links(&self, links: Vec<String>) {
        *self.pending_links.lock().unwrap() = links;
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Mirror a message into both the tracing output and the run log.
    pub fn log(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.run_state.lock().unwrap().push_log(message);
    }
}
