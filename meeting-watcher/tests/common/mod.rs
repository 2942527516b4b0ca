#![allow(dead_code)]

use async_trait::async_trait;
use meeting_watcher::discovery::YEAR_CALENDAR_SELECTOR;
use meeting_watcher::fetcher::{CONTENT_SELECTOR, DETAIL_READY_SELECTOR, MODAL_SELECTOR};
use meeting_watcher::types::{
    ContentId, MailSettings, MonitorConfig, OutboundMessage, PageError, WatchError, DEFAULT_CATEGORIES,
};
use meeting_watcher::{Notifier, PageSession};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://calendar.test/motekalender";

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        base_url: BASE_URL.to_string(),
        categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        tick_interval: Duration::from_secs(10),
        heartbeat_interval: Duration::from_secs(3600),
        settle_delay: Duration::ZERO,
        wait_timeout_ms: 100,
    }
}

pub fn mail_settings() -> MailSettings {
    MailSettings {
        from: "Watcher <bot@example.org>".to_string(),
        change_recipients: vec!["desk@example.org".to_string(), "editor@example.org".to_string()],
        heartbeat_recipient: "ops@example.org".to_string(),
    }
}

pub fn ids(raw: &[&str]) -> Vec<ContentId> {
    raw.iter().map(|id| ContentId::new(*id)).collect()
}

#[derive(Default)]
struct SessionState {
    current_url: String,
    discovered: Vec<Value>,
    snapshots: HashMap<String, VecDeque<String>>,
    headers: HashMap<String, String>,
    failing: HashSet<String>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    extractors: Vec<String>,
    closed: bool,
}

/// In-memory page session. Clones share state so a test can keep a handle
/// after boxing one into the monitor.
#[derive(Clone, Default)]
pub struct ScriptedSession {
    state: Arc<Mutex<SessionState>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovered(self, ids: &[&str]) -> Self {
        self.state.lock().unwrap().discovered = ids.iter().map(|id| json!(id)).collect();
        self
    }

    pub fn with_raw_discovered(self, values: Vec<Value>) -> Self {
        self.state.lock().unwrap().discovered = values;
        self
    }

    /// Successive fetches of `id` return these in order; the last one repeats.
    pub fn script(&self, id: &str, snapshots: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .insert(id.to_string(), snapshots.iter().map(|s| s.to_string()).collect());
    }

    pub fn set_header(&self, id: &str, header: &str) {
        self.state
            .lock()
            .unwrap()
            .headers
            .insert(id.to_string(), header.to_string());
    }

    pub fn fail(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn recover(&self, id: &str) {
        self.state.lock().unwrap().failing.remove(id);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn extractors(&self) -> Vec<String> {
        self.state.lock().unwrap().extractors.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn current_id(state: &SessionState) -> String {
        state.current_url.rsplit('/').next().unwrap_or_default().to_string()
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut state = self.state.lock().unwrap();
        state.current_url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError> {
        let state = self.state.lock().unwrap();
        if selector == DETAIL_READY_SELECTOR && state.failing.contains(&Self::current_id(&state)) {
            return Err(PageError::Timeout {
                timeout_ms,
                context: format!("waiting for {}", selector),
            });
        }
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        self.state.lock().unwrap().clicks.push(selector.to_string());
        Ok(())
    }

    async fn extract(&self, selector: &str, extractor: &str) -> Result<Value, PageError> {
        let mut state = self.state.lock().unwrap();
        state.extractors.push(extractor.to_string());
        let id = Self::current_id(&state);
        match selector {
            s if s == YEAR_CALENDAR_SELECTOR => Ok(Value::Array(state.discovered.clone())),
            s if s == MODAL_SELECTOR => {
                let queue = state.snapshots.entry(id).or_default();
                let html = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                Ok(html.map(Value::String).unwrap_or(Value::Null))
            }
            s if s == CONTENT_SELECTOR => match state.headers.get(&id) {
                Some(header) => Ok(json!(header)),
                None => Err(PageError::ElementNotFound {
                    selector: "t".to_string(),
                }),
            },
            other => Err(PageError::ElementNotFound {
                selector: other.to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), PageError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Scripted session whose navigations take `delay`. Tracks how many
/// navigations are in flight at once.
#[derive(Clone)]
pub struct SlowSession {
    inner: ScriptedSession,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl SlowSession {
    pub fn new(inner: ScriptedSession, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSession for SlowSession {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.navigate(url).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<(), PageError> {
        self.inner.wait_for_selector(selector, timeout_ms).await
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        self.inner.click(selector).await
    }

    async fn extract(&self, selector: &str, extractor: &str) -> Result<Value, PageError> {
        self.inner.extract(selector, extractor).await
    }

    async fn close(&self) -> Result<(), PageError> {
        self.inner.close().await
    }
}

/// Keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let notifier = Self::default();
        *notifier.failing.lock().unwrap() = true;
        Arc::new(notifier)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to.iter().any(|to| to == recipient))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &OutboundMessage) -> meeting_watcher::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        if *self.failing.lock().unwrap() {
            return Err(WatchError::Notification("HTTP 401 Unauthorized".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
