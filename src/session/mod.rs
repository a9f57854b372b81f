//! Capability interface over one live remote-control session.
//!
//! The runner owns exactly one session per run and is its only caller; the
//! trait exists so the state machine and the step pipeline can be driven
//! against a scripted in-memory session in tests. The production
//! implementation is [`cdp::CdpSession`].

use async_trait::async_trait;
use thiserror::Error;

pub mod cdp;

pub use cdp::{CdpSession, SessionOptions};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session unavailable: {0}")]
    Unavailable(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("interaction failed: {0}")]
    Interaction(String),
}

/// A pending native dialog (alert / confirm / prompt).
#[derive(Debug, Clone)]
pub struct Dialog {
    pub message: String,
    pub kind: String,
}

/// Element locator kinds. Cascades of these are plain data, evaluated in
/// declared order by the pipeline's first-match combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// By element id.
    Id(String),
    /// By css class name.
    Class(String),
    /// By tag name.
    Tag(String),
    /// By visible-text substring.
    Text(String),
    /// By attribute-value substring on a tag.
    AttrContains {
        tag: String,
        attr: String,
        needle: String,
    },
    /// A raw css selector, for candidates the other kinds cannot express.
    Css(String),
}

impl Locator {
    pub fn id(id: &str) -> Self {
        Locator::Id(id.to_string())
    }

    pub fn class(name: &str) -> Self {
        Locator::Class(name.to_string())
    }

    pub fn tag(name: &str) -> Self {
        Locator::Tag(name.to_string())
    }

    pub fn text(needle: &str) -> Self {
        Locator::Text(needle.to_string())
    }

    pub fn attr_contains(tag: &str, attr: &str, needle: &str) -> Self {
        Locator::AttrContains {
            tag: tag.to_string(),
            attr: attr.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    /// The concrete query this locator compiles to.
    pub fn to_query(&self) -> Query {
        match self {
            Locator::Id(id) => Query::Css(format!("#{id}")),
            Locator::Class(name) => Query::Css(format!(".{name}")),
            Locator::Tag(name) => Query::Css(name.clone()),
            Locator::Css(selector) => Query::Css(selector.clone()),
            Locator::AttrContains { tag, attr, needle } => {
                Query::Css(format!("{tag}[{attr}*='{needle}']"))
            }
            Locator::Text(needle) => Query::XPath(format!(
                "//*[contains(normalize-space(text()), '{needle}')]"
            )),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.to_query().fmt(f)
    }
}

/// A compiled locator query for the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css(String),
    XPath(String),
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Css(selector) => f.write_str(selector),
            Query::XPath(xpath) => write!(f, "xpath({xpath})"),
        }
    }
}

#[async_trait]
pub trait ControlElement: Send + Sync {
    async fn click(&self) -> Result<(), SessionError>;
    async fn type_text(&self, text: &str) -> Result<(), SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
    async fn press_enter(&self) -> Result<(), SessionError>;
    async fn text(&self) -> Option<String>;
    /// Displayed and enabled — safe to click.
    async fn is_actionable(&self) -> bool;
}

#[async_trait]
pub trait ControlSession: Send + Sync {
    type Element: ControlElement;

    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    /// Locate one element. Absence is a normal branch, never an error.
    async fn find(&self, locator: &Locator) -> Option<Self::Element>;

    async fn find_all(&self, locator: &Locator) -> Vec<Self::Element>;

    /// Take the pending native dialog, if one opened since the last call.
    async fn take_dialog(&self) -> Option<Dialog>;

    /// Acknowledge (accept) the current dialog.
    async fn accept_dialog(&self) -> Result<(), SessionError>;

    /// Idempotent teardown; safe to call on an already-closed session.
    async fn close(&mut self);
}
