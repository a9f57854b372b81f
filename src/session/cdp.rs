//! Chromium-backed [`ControlSession`] via the DevTools protocol.
//!
//! Two acquisition modes:
//! * spawn a controlled instance — auto-discovered executable, headless by
//!   default, stealth flags;
//! * attach to an already-running instance at a known DevTools endpoint.
//!
//! One background task drains CDP events for the connection; another captures
//! javascript dialog openings into a slot the pipeline polls through
//! `take_dialog`. Closing an attached session closes only the tab this
//! service opened, never the externally-owned browser.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Element, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{ControlElement, ControlSession, Dialog, Locator, Query, SessionError};
use crate::core::config::PilotConfig;

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for a controlled instance.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and for suppressing the
/// `navigator.webdriver` automation fingerprint; the UA is drawn from
/// `DESKTOP_USER_AGENTS`.
fn build_browser_config(exe: &str, headless: bool) -> Result<BrowserConfig, SessionError> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1920,
            height: 1080,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| SessionError::Unavailable(format!("failed to build browser config: {e}")))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Session acquisition options, resolved once from [`PilotConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// DevTools websocket endpoint of an already-running browser to attach to.
    pub attach_endpoint: Option<String>,
    pub headless: bool,
}

impl SessionOptions {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            attach_endpoint: config.resolve_attach_endpoint(),
            headless: config.resolve_headless(),
        }
    }
}

pub struct CdpSession {
    browser: Option<Browser>,
    page: Option<Page>,
    /// `true` when this process spawned the browser and may close it.
    owns_browser: bool,
    dialog: Arc<Mutex<Option<Dialog>>>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl CdpSession {
    /// Establish or attach to a remote control session. Failure here is
    /// fatal to the run.
    pub async fn open(options: &SessionOptions) -> Result<Self, SessionError> {
        let (browser, handler, owns_browser) = match &options.attach_endpoint {
            Some(endpoint) => {
                info!("🔌 attaching to running browser at {}", endpoint);
                let (browser, handler) =
                    Browser::connect(endpoint.clone()).await.map_err(|e| {
                        SessionError::Unavailable(format!("attach to {endpoint} failed: {e}"))
                    })?;
                (browser, handler, false)
            }
            None => {
                let exe = find_chrome_executable().ok_or_else(|| {
                    SessionError::Unavailable(
                        "no browser found — install Chrome or Chromium, or set CHROME_EXECUTABLE"
                            .to_string(),
                    )
                })?;
                info!("🚀 launching controlled browser ({})", exe);
                let config = build_browser_config(&exe, options.headless)?;
                let (browser, handler) = Browser::launch(config).await.map_err(|e| {
                    SessionError::Unavailable(format!("launch failed ({exe}): {e}"))
                })?;
                (browser, handler, true)
            }
        };

        let mut tasks = Vec::new();
        let mut handler = handler;
        tasks.push(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        }));

        let page = browser.new_page("about:blank").await.map_err(|e| {
            SessionError::Unavailable(format!("failed to open tab: {e}"))
        })?;

        let dialog = Arc::new(Mutex::new(None));
        match page.event_listener::<EventJavascriptDialogOpening>().await {
            Ok(mut events) => {
                let slot = Arc::clone(&dialog);
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        let captured = Dialog {
                            message: event.message.clone(),
                            kind: format!("{:?}", event.r#type).to_lowercase(),
                        };
                        *slot.lock().unwrap() = Some(captured);
                    }
                }));
            }
            Err(e) => warn!("dialog listener unavailable: {}", e),
        }

        Ok(Self {
            browser: Some(browser),
            page: Some(page),
            owns_browser,
            dialog,
            tasks,
            closed: false,
        })
    }

    fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }
}

#[async_trait]
impl ControlSession for CdpSession {
    type Element = CdpElement;

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        url::Url::parse(url)
            .map_err(|e| SessionError::Navigation(format!("invalid url '{url}': {e}")))?;
        let page = self
            .page()
            .ok_or_else(|| SessionError::Navigation("session already closed".to_string()))?;
        page.goto(url)
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Option<CdpElement> {
        let page = self.page()?;
        let inner = match locator.to_query() {
            Query::Css(selector) => page.find_element(selector).await.ok()?,
            Query::XPath(xpath) => page.find_xpath(xpath).await.ok()?,
        };
        Some(CdpElement { inner })
    }

    async fn find_all(&self, locator: &Locator) -> Vec<CdpElement> {
        let Some(page) = self.page() else {
            return Vec::new();
        };
        let elements = match locator.to_query() {
            Query::Css(selector) => page.find_elements(selector).await,
            Query::XPath(xpath) => page.find_xpaths(xpath).await,
        };
        elements
            .unwrap_or_default()
            .into_iter()
            .map(|inner| CdpElement { inner })
            .collect()
    }

    async fn take_dialog(&self) -> Option<Dialog> {
        self.dialog.lock().unwrap().take()
    }

    async fn accept_dialog(&self) -> Result<(), SessionError> {
        let page = self
            .page()
            .ok_or_else(|| SessionError::Interaction("session already closed".to_string()))?;
        let params = HandleJavaScriptDialogParams::builder()
            .accept(true)
            .build()
            .map_err(SessionError::Interaction)?;
        page.execute(params)
            .await
            .map_err(|e| SessionError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("tab close error (non-fatal): {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if self.owns_browser {
                if let Err(e) = browser.close().await {
                    warn!("browser close error (non-fatal): {}", e);
                }
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("🧹 control session closed");
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        // Backstop only — the runner closes explicitly. Drop cannot await, so
        // spawn the close when a runtime is still around.
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        if !self.owns_browser {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = browser.close().await;
            });
        }
    }
}

// ── Element ──────────────────────────────────────────────────────────────────

pub struct CdpElement {
    inner: Element,
}

#[async_trait]
impl ControlElement for CdpElement {
    async fn click(&self) -> Result<(), SessionError> {
        self.inner
            .click()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Interaction(e.to_string()))
    }

    async fn type_text(&self, text: &str) -> Result<(), SessionError> {
        self.inner
            .type_str(text)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Interaction(e.to_string()))
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.inner
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Interaction(e.to_string()))
    }

    async fn press_enter(&self) -> Result<(), SessionError> {
        self.inner
            .press_key("Enter")
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Interaction(e.to_string()))
    }

    async fn text(&self) -> Option<String> {
        self.inner.inner_text().await.ok().flatten()
    }

    async fn is_actionable(&self) -> bool {
        self.inner
            .call_js_fn(
                "function() { return !this.disabled && this.offsetParent !== null; }",
                false,
            )
            .await
            .ok()
            .and_then(|ret| ret.result.value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
