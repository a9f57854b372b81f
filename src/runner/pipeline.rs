//! The fixed per-item step pipeline.
//!
//! Order per link: navigate, authenticate, dismiss interstitials, invoke the
//! target control. Everything past navigation is best-effort — failures land
//! in the run log and the pipeline keeps going, so one stubborn page never
//! stops the batch. Candidate locator cascades are plain data scanned by
//! [`first_match`] / [`first_actionable`] in declared order, first success
//! wins.

use std::sync::OnceLock;
use std::time::Duration;

use aho_corasick::AhoCorasick;

use super::RunHandle;
use crate::core::config::{Credentials, PilotConfig};
use crate::session::{ControlElement, ControlSession, Locator, SessionError};

/// Per-run pipeline tuning, resolved once from config at run start.
#[derive(Debug, Clone)]
pub struct Tuning {
    pub settle_delay: Duration,
    pub post_click_wait: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(3),
            post_click_wait: Duration::from_millis(1000),
            credentials: None,
        }
    }
}

impl Tuning {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            settle_delay: config.resolve_settle_delay(),
            post_click_wait: config.resolve_post_click_wait(),
            credentials: config.resolve_credentials(),
        }
    }
}

/// What happened to a single item, beyond "attempted".
#[derive(Debug, Default, Clone, Copy)]
pub struct ItemOutcome {
    pub clicked: bool,
}

// ── Candidate cascades ───────────────────────────────────────────────────────

fn username_fields() -> Vec<Locator> {
    vec![
        Locator::css("input[name='username']"),
        Locator::css("input[name='user_id']"),
        Locator::css("input[name='id']"),
        Locator::css("input[id='username']"),
        Locator::css("input[id='user_id']"),
        Locator::css("input[id='id']"),
    ]
}

fn password_fields() -> Vec<Locator> {
    vec![
        Locator::css("input[name='password']"),
        Locator::css("input[name='passwd']"),
        Locator::css("input[name='pw']"),
        Locator::css("input[id='password']"),
        Locator::css("input[id='passwd']"),
        Locator::css("input[id='pw']"),
    ]
}

fn submit_controls() -> Vec<Locator> {
    vec![
        Locator::css("input[type='submit']"),
        Locator::css("button[type='submit']"),
        Locator::attr_contains("input", "value", "로그인"),
        Locator::text("로그인"),
        Locator::text("Login"),
    ]
}

fn target_controls() -> Vec<Locator> {
    vec![
        Locator::id("update_start"),
        Locator::attr_contains("input", "value", "상품업데이트"),
        Locator::text("상품업데이트"),
        Locator::attr_contains("input", "value", "시작"),
        Locator::text("시작"),
        Locator::css("input[type='button'][value*='업데이트']"),
        Locator::css("button[class*='update']"),
        Locator::css("a[href*='update']"),
    ]
}

fn banner_containers() -> Vec<Locator> {
    vec![
        Locator::css("div[class*='modal']"),
        Locator::css("div[class*='popup']"),
        Locator::css("div[class*='layer']"),
        Locator::css("div[id*='captcha']"),
    ]
}

fn banner_confirm_controls() -> Vec<Locator> {
    vec![
        Locator::css("button[class*='confirm']"),
        Locator::css("input[type='button']"),
        Locator::css("a[class*='close']"),
        Locator::tag("button"),
    ]
}

const BANNER_KEYWORDS: &[&str] = &[
    "captcha",
    "robot",
    "automation",
    "suspicious activity",
    "자동입력",
];

static BANNER_MATCHER: OnceLock<AhoCorasick> = OnceLock::new();

fn banner_matcher() -> &'static AhoCorasick {
    BANNER_MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(BANNER_KEYWORDS)
            .expect("valid banner keywords")
    })
}

/// Does this container text read like an "automation blocked" banner?
pub fn looks_like_blocker(text: &str) -> bool {
    banner_matcher().is_match(text)
}

// ── First-match combinators ──────────────────────────────────────────────────

/// Linear first-match scan: try candidates in declared order, return the
/// first that resolves, ignore the rest.
pub async fn first_match<S: ControlSession>(
    session: &S,
    candidates: &[Locator],
) -> Option<S::Element> {
    for locator in candidates {
        if let Some(element) = session.find(locator).await {
            return Some(element);
        }
    }
    None
}

/// Like [`first_match`] but the element must also be displayed and enabled.
pub async fn first_actionable<S: ControlSession>(
    session: &S,
    candidates: &[Locator],
) -> Option<(S::Element, Locator)> {
    for locator in candidates {
        if let Some(element) = session.find(locator).await {
            if element.is_actionable().await {
                return Some((element, locator.clone()));
            }
        }
    }
    None
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// Apply the full pipeline to one link. Only navigation failure fails the
/// item; every later step swallows its own errors.
pub async fn process_item<S: ControlSession>(
    session: &S,
    link: &str,
    tuning: &Tuning,
    run: &RunHandle,
) -> Result<ItemOutcome, SessionError> {
    session.navigate(link).await?;
    tokio::time::sleep(tuning.settle_delay).await;

    try_login(session, tuning, run).await;
    dismiss_dialog(session, run).await;
    dismiss_blocker_banner(session, run).await;
    let clicked = invoke_target_control(session, tuning, run).await;

    Ok(ItemOutcome { clicked })
}

/// Best-effort auto-login. No login form is the expected common case; the
/// step only acts when both a username and a password field resolve and
/// credentials are configured.
async fn try_login<S: ControlSession>(session: &S, tuning: &Tuning, run: &RunHandle) {
    let Some(credentials) = tuning.credentials.as_ref() else {
        return;
    };

    let Some(username_field) = first_match(session, &username_fields()).await else {
        return;
    };
    let Some(password_field) = first_match(session, &password_fields()).await else {
        return;
    };

    run.log("🔐 login form found — signing in");
    if let Err(e) = fill_field(&username_field, &credentials.username).await {
        run.log(format!("⚠️ could not fill username field: {e}"));
        return;
    }
    if let Err(e) = fill_field(&password_field, &credentials.password).await {
        run.log(format!("⚠️ could not fill password field: {e}"));
        return;
    }

    if let Some(submit) = first_match(session, &submit_controls()).await {
        match submit.click().await {
            Ok(()) => run.log("✅ login submitted"),
            Err(e) => run.log(format!("⚠️ login submit failed: {e}")),
        }
    } else {
        // No submit control anywhere — a terminal Enter on the password
        // field submits most forms.
        match password_field.press_enter().await {
            Ok(()) => run.log("✅ login submitted (enter fallback)"),
            Err(e) => run.log(format!("⚠️ login submit failed: {e}")),
        }
    }
    tokio::time::sleep(tuning.post_click_wait).await;
}

async fn fill_field<E: ControlElement>(field: &E, value: &str) -> Result<(), SessionError> {
    field.clear().await?;
    field.type_text(value).await
}

/// Accept a pending native dialog, if any. "No dialog" is the normal branch.
async fn dismiss_dialog<S: ControlSession>(session: &S, run: &RunHandle) {
    let Some(dialog) = session.take_dialog().await else {
        return;
    };
    run.log(format!("🚨 {} dialog: {}", dialog.kind, dialog.message));
    match session.accept_dialog().await {
        Ok(()) => run.log("✅ dialog accepted"),
        Err(e) => run.log(format!("⚠️ dialog accept failed: {e}")),
    }
}

/// Scan for in-page "automation blocked" banners and click their
/// confirm/close control when one matches the keyword set.
async fn dismiss_blocker_banner<S: ControlSession>(session: &S, run: &RunHandle) {
    for container in banner_containers() {
        for element in session.find_all(&container).await {
            let Some(text) = element.text().await else {
                continue;
            };
            if !looks_like_blocker(&text) {
                continue;
            }
            run.log(format!("🛡 blocker banner detected ({container})"));
            if let Some(confirm) = first_match(session, &banner_confirm_controls()).await {
                match confirm.click().await {
                    Ok(()) => run.log("✅ blocker banner dismissed"),
                    Err(e) => run.log(format!("⚠️ banner dismiss failed: {e}")),
                }
            }
            return;
        }
    }
}

/// Walk the target-control cascade; the first candidate that is displayed
/// and enabled gets the click. No match is only a log note.
async fn invoke_target_control<S: ControlSession>(
    session: &S,
    tuning: &Tuning,
    run: &RunHandle,
) -> bool {
    let Some((control, locator)) = first_actionable(session, &target_controls()).await else {
        run.log("⚠️ target control not found");
        return false;
    };
    match control.click().await {
        Ok(()) => {
            run.log(format!("🎯 target control clicked ({locator})"));
            tokio::time::sleep(tuning.post_click_wait).await;
            true
        }
        Err(e) => {
            run.log(format!("⚠️ target control click failed: {e}"));
            false
        }
    }
}
