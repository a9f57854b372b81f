//! The run state machine.
//!
//! One background task per run owns the control session and walks the staged
//! link list: `ready → connecting → running → {completed | error}`. Setup
//! failure (no session) is the only terminal error; a bad page is logged,
//! counted as processed, and the loop moves on. A stop request flips a flag
//! observed between items and the run winds down through the normal
//! completion path. Nothing is retried automatically.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use crate::core::app_state::AppState;
use crate::core::run_state::{RunState, RunStatus};
use crate::session::{ControlSession, SessionError};

pub mod pipeline;

pub use pipeline::Tuning;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("no links staged — submit a workbook first")]
    NothingStaged,
}

/// The slice of shared state the runner writes: progress record + stop flag.
#[derive(Clone)]
pub struct RunHandle {
    pub state: Arc<Mutex<RunState>>,
    pub stop: Arc<AtomicBool>,
}

impl RunHandle {
    /// Mirror a message into both the tracing output and the run log.
    pub fn log(&self, message: impl AsRef<str>) {
        info!("{}", message.as_ref());
        self.state.lock().unwrap().push_log(message);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: RunStatus) {
        self.state.lock().unwrap().status = status;
    }
}

/// Single-flight admission: checks the guard, copies the staged working set,
/// and moves the state machine to `connecting`. The caller spawns [`drive`]
/// with the returned links; on rejection nothing changes.
pub fn try_begin(state: &AppState) -> Result<Vec<String>, StartError> {
    let links = state.pending_links.lock().unwrap().clone();
    let mut run = state.run_state.lock().unwrap();
    if run.status.is_active() {
        return Err(StartError::AlreadyRunning);
    }
    if links.is_empty() {
        return Err(StartError::NothingStaged);
    }
    run.begin(links.len());
    state.stop_flag.store(false, Ordering::SeqCst);
    Ok(links)
}

/// Execute one full run: open the session through `opener`, process every
/// link with continue-on-error, close the session exactly once.
pub async fn drive<S, F, Fut>(opener: F, links: Vec<String>, run: RunHandle, tuning: Tuning)
where
    S: ControlSession,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S, SessionError>>,
{
    run.log(format!("🚀 run started — {} links", links.len()));

    let mut session = match opener().await {
        Ok(session) => session,
        Err(e) => {
            let message = format!("browser session unavailable: {e}");
            warn!("{message}");
            let mut state = run.state.lock().unwrap();
            state.push_log(format!("❌ {message}"));
            state.fail(message);
            return;
        }
    };
    run.log("✅ browser session acquired");
    run.set_status(RunStatus::Running);

    let total = links.len();
    for (index, link) in links.iter().enumerate() {
        if run.stop_requested() {
            run.log("⏹ stop requested — ending run");
            break;
        }
        run.state.lock().unwrap().current_link = link.clone();
        run.log(format!("🔗 [{}/{}] {}", index + 1, total, link));

        match pipeline::process_item(&session, link, &tuning, &run).await {
            Ok(outcome) => {
                if outcome.clicked {
                    run.state.lock().unwrap().clicked += 1;
                }
            }
            Err(e) => run.log(format!("⚠️ {link}: {e}")),
        }
        // Per-item outcome is advisory; every attempted item counts.
        run.state.lock().unwrap().processed += 1;
    }

    session.close().await;
    {
        let mut state = run.state.lock().unwrap();
        state.current_link.clear();
        state.status = RunStatus::Completed;
    }
    run.log("🎉 run finished");
}
