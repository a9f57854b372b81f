//! Runner behaviour against a scripted in-memory session.
//!
//! The mock session resolves locators from a fixed element table keyed by
//! the compiled query string, so the same cascades the live pipeline walks
//! can be scripted per test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use link_pilot::core::config::{Credentials, PilotConfig};
use link_pilot::core::run_state::RunStatus;
use link_pilot::runner::{self, pipeline, StartError, Tuning};
use link_pilot::session::{ControlElement, ControlSession, Dialog, Locator, SessionError};
use link_pilot::AppState;

// ── Scripted session ─────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct MockElement {
    text: String,
    actionable: bool,
    clicks: Arc<AtomicUsize>,
    typed: Arc<Mutex<Vec<String>>>,
}

impl MockElement {
    fn actionable() -> Self {
        Self {
            actionable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ControlElement for MockElement {
    async fn click(&self) -> Result<(), SessionError> {
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }

    async fn is_actionable(&self) -> bool {
        self.actionable
    }
}

#[derive(Default)]
struct MockSession {
    /// URLs whose navigation fails.
    broken: Vec<String>,
    /// Elements keyed by the locator's compiled query string.
    elements: HashMap<String, MockElement>,
    dialogs: Mutex<VecDeque<Dialog>>,
    visited: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
}

impl MockSession {
    fn with_element(mut self, locator: &Locator, element: MockElement) -> Self {
        self.elements.insert(locator.to_string(), element);
        self
    }
}

#[async_trait]
impl ControlSession for MockSession {
    type Element = MockElement;

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        if self.broken.iter().any(|b| b == url) {
            return Err(SessionError::Navigation(format!("unreachable: {url}")));
        }
        self.visited.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Option<MockElement> {
        self.elements.get(&locator.to_string()).cloned()
    }

    async fn find_all(&self, locator: &Locator) -> Vec<MockElement> {
        self.find(locator).await.into_iter().collect()
    }

    async fn take_dialog(&self) -> Option<Dialog> {
        self.dialogs.lock().unwrap().pop_front()
    }

    async fn accept_dialog(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fast_tuning() -> Tuning {
    Tuning {
        settle_delay: Duration::ZERO,
        post_click_wait: Duration::ZERO,
        credentials: None,
    }
}

fn staged_state(links: &[&str]) -> AppState {
    let state = AppState::new(PilotConfig::default());
    state.stage_links(links.iter().map(|s| s.to_string()).collect());
    state
}

fn log_contains(state: &AppState, needle: &str) -> bool {
    state
        .run_state
        .lock()
        .unwrap()
        .snapshot()
        .logs
        .iter()
        .any(|line| line.contains(needle))
}

// ── Runner state machine ─────────────────────────────────────────────────────

#[tokio::test]
async fn continue_on_error_processes_every_link() {
    let state = staged_state(&["http://a.example", "http://broken.example", "http://c.example"]);
    let links = runner::try_begin(&state).unwrap();

    let session = MockSession {
        broken: vec!["http://broken.example".to_string()],
        ..Default::default()
    };
    let visited = Arc::clone(&session.visited);
    let closes = Arc::clone(&session.closes);

    runner::drive(
        move || async move { Ok(session) },
        links,
        state.run_handle(),
        fast_tuning(),
    )
    .await;

    let snapshot = state.run_state.lock().unwrap().snapshot();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.processed, 3, "a bad item still counts as attempted");
    assert_eq!(
        *visited.lock().unwrap(),
        vec!["http://a.example", "http://c.example"]
    );
    assert!(log_contains(&state, "unreachable: http://broken.example"));
    assert_eq!(closes.load(Ordering::SeqCst), 1, "session closed exactly once");
    assert!(snapshot.current_link.is_empty());
}

#[tokio::test]
async fn session_open_failure_is_terminal() {
    let state = staged_state(&["http://a.example"]);
    let links = runner::try_begin(&state).unwrap();

    runner::drive(
        || async { Err::<MockSession, _>(SessionError::Unavailable("no browser found".into())) },
        links,
        state.run_handle(),
        fast_tuning(),
    )
    .await;

    let snapshot = state.run_state.lock().unwrap().snapshot();
    assert_eq!(snapshot.status, RunStatus::Error);
    assert_eq!(snapshot.processed, 0);
    assert!(snapshot
        .error
        .as_deref()
        .unwrap()
        .contains("no browser found"));
}

#[tokio::test]
async fn start_guard_enforces_single_flight() {
    let state = staged_state(&["http://a.example"]);

    // First start wins and moves the machine to `connecting`…
    let links = runner::try_begin(&state).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(
        state.run_state.lock().unwrap().status,
        RunStatus::Connecting
    );

    // …and a second start while active is rejected without touching state.
    assert_eq!(
        runner::try_begin(&state).unwrap_err(),
        StartError::AlreadyRunning
    );
    assert_eq!(
        state.run_state.lock().unwrap().status,
        RunStatus::Connecting
    );
}

#[tokio::test]
async fn start_with_nothing_staged_is_rejected() {
    let state = AppState::new(PilotConfig::default());
    assert_eq!(
        runner::try_begin(&state).unwrap_err(),
        StartError::NothingStaged
    );
    assert_eq!(state.run_state.lock().unwrap().status, RunStatus::Ready);
}

#[tokio::test]
async fn stop_requested_ends_run_at_item_boundary() {
    let state = staged_state(&["http://a.example", "http://b.example"]);
    let links = runner::try_begin(&state).unwrap();

    // Stop lands after admission (try_begin clears the flag) and before any
    // item has been attempted.
    state.request_stop();

    let session = MockSession::default();
    let closes = Arc::clone(&session.closes);
    runner::drive(
        move || async move { Ok(session) },
        links,
        state.run_handle(),
        fast_tuning(),
    )
    .await;

    let snapshot = state.run_state.lock().unwrap().snapshot();
    assert_eq!(snapshot.status, RunStatus::Completed);
    assert_eq!(snapshot.processed, 0);
    assert!(log_contains(&state, "stop requested"));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clicked_counter_tracks_target_hits() {
    let state = staged_state(&["http://a.example", "http://b.example"]);
    let links = runner::try_begin(&state).unwrap();

    let control = MockElement::actionable();
    let clicks = Arc::clone(&control.clicks);
    let session = MockSession::default().with_element(&Locator::id("update_start"), control);

    runner::drive(
        move || async move { Ok(session) },
        links,
        state.run_handle(),
        fast_tuning(),
    )
    .await;

    let snapshot = state.run_state.lock().unwrap().snapshot();
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.clicked, 2);
    assert_eq!(clicks.load(Ordering::SeqCst), 2);
    assert!(log_contains(&state, "target control clicked"));
}

// ── Step pipeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_target_control_is_a_log_note_not_a_failure() {
    let state = staged_state(&["http://a.example"]);
    let session = MockSession::default();

    let outcome = pipeline::process_item(
        &session,
        "http://a.example",
        &fast_tuning(),
        &state.run_handle(),
    )
    .await
    .unwrap();

    assert!(!outcome.clicked);
    assert!(log_contains(&state, "target control not found"));
}

#[tokio::test]
async fn disabled_target_control_is_skipped() {
    let state = staged_state(&["http://a.example"]);
    // Present but not actionable — the cascade must not click it.
    let control = MockElement::default();
    let clicks = Arc::clone(&control.clicks);
    let session = MockSession::default().with_element(&Locator::id("update_start"), control);

    let outcome = pipeline::process_item(
        &session,
        "http://a.example",
        &fast_tuning(),
        &state.run_handle(),
    )
    .await
    .unwrap();

    assert!(!outcome.clicked);
    assert_eq!(clicks.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_fills_both_fields_and_submits() {
    let state = staged_state(&["http://a.example"]);

    let username = MockElement::default();
    let password = MockElement::default();
    let submit = MockElement::actionable();
    let typed_username = Arc::clone(&username.typed);
    let typed_password = Arc::clone(&password.typed);
    let submit_clicks = Arc::clone(&submit.clicks);

    let session = MockSession::default()
        .with_element(&Locator::css("input[name='username']"), username)
        .with_element(&Locator::css("input[name='password']"), password)
        .with_element(&Locator::css("input[type='submit']"), submit);

    let tuning = Tuning {
        credentials: Some(Credentials {
            username: "operator".into(),
            password: "hunter2".into(),
        }),
        ..fast_tuning()
    };

    pipeline::process_item(&session, "http://a.example", &tuning, &state.run_handle())
        .await
        .unwrap();

    assert_eq!(*typed_username.lock().unwrap(), vec!["operator"]);
    assert_eq!(*typed_password.lock().unwrap(), vec!["hunter2"]);
    assert_eq!(submit_clicks.load(Ordering::SeqCst), 1);
    assert!(log_contains(&state, "login form found"));
    assert!(log_contains(&state, "login submitted"));
}

#[tokio::test]
async fn login_is_skipped_when_only_one_field_resolves() {
    let state = staged_state(&["http://a.example"]);
    let username = MockElement::default();
    let typed = Arc::clone(&username.typed);
    let session =
        MockSession::default().with_element(&Locator::css("input[name='username']"), username);

    let tuning = Tuning {
        credentials: Some(Credentials {
            username: "operator".into(),
            password: "hunter2".into(),
        }),
        ..fast_tuning()
    };

    pipeline::process_item(&session, "http://a.example", &tuning, &state.run_handle())
        .await
        .unwrap();

    assert!(typed.lock().unwrap().is_empty(), "no password field, no fill");
    assert!(!log_contains(&state, "login form found"));
}

#[tokio::test]
async fn pending_dialog_is_logged_and_accepted() {
    let state = staged_state(&["http://a.example"]);
    let session = MockSession::default();
    session.dialogs.lock().unwrap().push_back(Dialog {
        message: "session expired".into(),
        kind: "alert".into(),
    });

    pipeline::process_item(
        &session,
        "http://a.example",
        &fast_tuning(),
        &state.run_handle(),
    )
    .await
    .unwrap();

    assert!(log_contains(&state, "alert dialog: session expired"));
    assert!(log_contains(&state, "dialog accepted"));
}

#[tokio::test]
async fn blocker_banner_is_dismissed_via_confirm_control() {
    let state = staged_state(&["http://a.example"]);

    let banner = MockElement {
        text: "Please verify you are not a robot".into(),
        ..Default::default()
    };
    let confirm = MockElement::actionable();
    let confirm_clicks = Arc::clone(&confirm.clicks);

    let session = MockSession::default()
        .with_element(&Locator::css("div[class*='modal']"), banner)
        .with_element(&Locator::css("button[class*='confirm']"), confirm);

    pipeline::process_item(
        &session,
        "http://a.example",
        &fast_tuning(),
        &state.run_handle(),
    )
    .await
    .unwrap();

    assert!(log_contains(&state, "blocker banner detected"));
    assert_eq!(confirm_clicks.load(Ordering::SeqCst), 1);
    assert!(log_contains(&state, "blocker banner dismissed"));
}

#[tokio::test]
async fn navigation_failure_fails_only_the_item() {
    let state = staged_state(&["http://broken.example"]);
    let session = MockSession {
        broken: vec!["http://broken.example".to_string()],
        ..Default::default()
    };

    let err = pipeline::process_item(
        &session,
        "http://broken.example",
        &fast_tuning(),
        &state.run_handle(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SessionError::Navigation(_)));
}
