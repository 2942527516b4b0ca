use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://bodo.innsynsportal.no/motekalender";
pub const DEFAULT_CATEGORIES: [&str; 3] = ["BYST", "FORM", "UTVPM"];

/// Identifier of one meeting entry in the calendar (the `id` of its `.fc-content` marker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Sanitized HTML of one meeting's detail region, captured at one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSnapshot(String);

impl ContentSnapshot {
    /// Wraps markup that has already been through `fetcher::strip_scripts`.
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered ids produced by discovery. Never empty and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TrackedSequence {
    ids: Vec<ContentId>,
}

impl TrackedSequence {
    pub fn new(ids: Vec<ContentId>) -> Result<Self> {
        if ids.is_empty() {
            return Err(WatchError::Discovery(
                "Couldn't find any content identifiers".to_string(),
            ));
        }
        Ok(Self { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id at `cursor`, wrapping past the end.
    pub fn get(&self, cursor: usize) -> &ContentId {
        &self.ids[cursor % self.ids.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentId> {
        self.ids.iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: ContentId,
    pub previous: Option<ContentSnapshot>,
    pub new: ContentSnapshot,
    /// Heading of the meeting; falls back to the raw id when it could not be read.
    pub header: String,
    pub detected_at: DateTime<Utc>,
}

/// Result of comparing a fresh snapshot with the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Seeded,
    Unchanged,
    Changed { previous: ContentSnapshot },
}

impl Detection {
    pub fn is_change(&self) -> bool {
        matches!(self, Detection::Changed { .. })
    }

    pub fn previous(&self) -> Option<&ContentSnapshot> {
        match self {
            Detection::Changed { previous } => Some(previous),
            _ => None,
        }
    }
}

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Seeded { id: ContentId },
    Unchanged { id: ContentId },
    Changed { id: ContentId },
    Failed { id: ContentId, error: String },
}

impl TickOutcome {
    pub fn id(&self) -> &ContentId {
        match self {
            TickOutcome::Seeded { id }
            | TickOutcome::Unchanged { id }
            | TickOutcome::Changed { id }
            | TickOutcome::Failed { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub base_url: String,
    pub categories: Vec<String>,
    pub tick_interval: Duration,
    pub heartbeat_interval: Duration,
    pub settle_delay: Duration,
    pub wait_timeout_ms: u64,
}

impl MonitorConfig {
    pub fn detail_url(&self, id: &ContentId) -> String {
        format!("{}/motedag/{}", self.base_url.trim_end_matches('/'), id)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            tick_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(24 * 60 * 60),
            settle_delay: Duration::from_millis(2000),
            wait_timeout_ms: 30_000,
        }
    }
}

/// Sender and recipients for outgoing mail.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub from: String,
    pub change_recipients: Vec<String>,
    pub heartbeat_recipient: String,
}

#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub api_base: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("failed to launch browser: {context}")]
    Launch { context: String },

    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout { timeout_ms: u64, context: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("evaluation failed: {0}")]
    Evaluate(String),

    #[error("CDP error: {0}")]
    Cdp(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Failed to fetch {id}: {source}")]
    Fetch {
        id: ContentId,
        #[source]
        source: PageError,
    },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Could not read header for {id}: {reason}")]
    HeaderExtraction { id: ContentId, reason: String },

    #[error("Page session error: {0}")]
    Page(#[from] PageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
