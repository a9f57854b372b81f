//! File-based config loader (`link-pilot.json`) with env-var fallback.

use std::time::Duration;

use crate::extract::MatchPolicy;

pub const ENV_CONFIG_PATH: &str = "LINK_PILOT_CONFIG";
pub const ENV_USERNAME: &str = "LINK_PILOT_USERNAME";
pub const ENV_PASSWORD: &str = "LINK_PILOT_PASSWORD";
pub const ENV_SETTLE_SECS: &str = "LINK_PILOT_SETTLE_SECS";
pub const ENV_POST_CLICK_MS: &str = "LINK_PILOT_POST_CLICK_MS";
pub const ENV_STRICT_PREFIX: &str = "LINK_PILOT_STRICT_PREFIX";
pub const ENV_ATTACH_ENDPOINT: &str = "LINK_PILOT_ATTACH_ENDPOINT";
pub const ENV_HEADLESS: &str = "LINK_PILOT_HEADLESS";

/// Fully resolved login credentials. Only produced when both halves are set —
/// the authenticate step is skipped entirely otherwise.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Credentials sub-config (mirrors the `credentials` key in link-pilot.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    /// Never logged.
    pub password: Option<String>,
}

/// Top-level config loaded from `link-pilot.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct PilotConfig {
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Seconds to wait after navigation before touching the page.
    pub settle_delay_secs: Option<u64>,
    /// Milliseconds to wait after a submit/target click.
    pub post_click_wait_ms: Option<u64>,
    /// When `true`, only tokens that *start with* `http` qualify during
    /// extraction, instead of the default contains rule.
    pub strict_prefix_links: Option<bool>,
    /// DevTools websocket endpoint (`ws://…`) of an already-running browser.
    /// When set, the runner attaches instead of spawning its own instance.
    pub attach_endpoint: Option<String>,
    pub headless: Option<bool>,
}

impl PilotConfig {
    /// Username/password: JSON fields → `LINK_PILOT_USERNAME` /
    /// `LINK_PILOT_PASSWORD` env vars → `None`.
    ///
    /// Both halves must resolve non-empty; a lone username is treated as
    /// no credentials at all.
    pub fn resolve_credentials(&self) -> Option<Credentials> {
        let username = self
            .credentials
            .username
            .clone()
            .or_else(|| std::env::var(ENV_USERNAME).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())?;
        let password = self
            .credentials
            .password
            .clone()
            .or_else(|| std::env::var(ENV_PASSWORD).ok())
            .filter(|v| !v.trim().is_empty())?;
        Some(Credentials { username, password })
    }

    /// Post-navigation settle delay: JSON field → `LINK_PILOT_SETTLE_SECS` → 3 s.
    pub fn resolve_settle_delay(&self) -> Duration {
        let secs = self.settle_delay_secs.or_else(|| {
            std::env::var(ENV_SETTLE_SECS).ok().and_then(|v| v.parse().ok())
        });
        Duration::from_secs(secs.unwrap_or(3))
    }

    /// Post-click wait: JSON field → `LINK_PILOT_POST_CLICK_MS` → 1000 ms.
    pub fn resolve_post_click_wait(&self) -> Duration {
        let ms = self.post_click_wait_ms.or_else(|| {
            std::env::var(ENV_POST_CLICK_MS).ok().and_then(|v| v.parse().ok())
        });
        Duration::from_millis(ms.unwrap_or(1000))
    }

    /// Extraction policy: JSON `strict_prefix_links` → `LINK_PILOT_STRICT_PREFIX`
    /// → split-and-contains.
    pub fn resolve_match_policy(&self) -> MatchPolicy {
        let strict = self.strict_prefix_links.unwrap_or_else(|| {
            std::env::var(ENV_STRICT_PREFIX)
                .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        });
        if strict {
            MatchPolicy::StrictPrefix
        } else {
            MatchPolicy::Contains
        }
    }

    /// Attach endpoint: JSON field → `LINK_PILOT_ATTACH_ENDPOINT` → none
    /// (spawn a controlled instance).
    pub fn resolve_attach_endpoint(&self) -> Option<String> {
        self.attach_endpoint
            .clone()
            .or_else(|| std::env::var(ENV_ATTACH_ENDPOINT).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Headless: JSON field → `LINK_PILOT_HEADLESS` (set to `0` for a visible
    /// window) → `true`.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        std::env::var(ENV_HEADLESS)
            .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
            .unwrap_or(true)
    }
}

/// Load `link-pilot.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `LINK_PILOT_CONFIG` env var path
/// 2. `./link-pilot.json` (process cwd)
/// 3. `~/.link-pilot/config.json`
///
/// Missing file → `PilotConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `PilotConfig::default()`.
pub fn load_config() -> PilotConfig {
    let mut candidates = vec![std::path::PathBuf::from("link-pilot.json")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".link-pilot").join("config.json"));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, std::path::PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<PilotConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("link-pilot.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "link-pilot.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return PilotConfig::default();
                }
            },
            Err(_) => continue, // file not found at this path — try next
        }
    }

    PilotConfig::default()
}
