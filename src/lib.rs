pub mod core;
pub mod extract;
pub mod runner;
pub mod session;
pub mod tabular;

// --- Primary core exports ---
pub use core::run_state::{RunState, RunStatus};
pub use core::types;
pub use core::types::*;
pub use core::AppState;
