use crate::traits::PageSession;
use crate::types::{ContentId, ContentSnapshot, MonitorConfig, PageError, Result, WatchError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Appears once the detail modal has been populated.
pub const DETAIL_READY_SELECTOR: &str = "#modalContent > div";
pub const MODAL_SELECTOR: &str = ".modal-content";
pub const CONTENT_SELECTOR: &str = "#modalContent";
/// The portal renders the meeting title in a `<t>` element.
pub const TITLE_SELECTOR: &str = "t";
/// Only consulted when no `<t>` element exists.
pub const HEADING_SELECTOR: &str = "h1, h2, h3";

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern is valid"));

/// Remove every `<script>...</script>` block, leaving all other markup untouched.
pub fn strip_scripts(html: &str) -> String {
    SCRIPT_BLOCK.replace_all(html, "").into_owned()
}

/// Reads a meeting's detail view out of the page session.
pub struct ContentFetcher {
    config: MonitorConfig,
}

impl ContentFetcher {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    pub fn detail_url(&self, id: &ContentId) -> String {
        self.config.detail_url(id)
    }

    pub async fn fetch(&self, session: &dyn PageSession, id: &ContentId) -> Result<ContentSnapshot> {
        let start_time = Instant::now();
        let url = self.detail_url(id);
        debug!("Fetching {} from {}", id, url);

        let fetch_error = |source: PageError| WatchError::Fetch { id: id.clone(), source };

        session.navigate(&url).await.map_err(fetch_error)?;
        session
            .wait_for_selector(DETAIL_READY_SELECTOR, self.config.wait_timeout_ms)
            .await
            .map_err(fetch_error)?;

        // The modal fills in asynchronously after the container shows up
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let extractor = format!(
            "e => {{ const c = e.querySelector({}); return c ? c.outerHTML : null; }}",
            js_string(CONTENT_SELECTOR)
        );
        let value = session
            .extract(MODAL_SELECTOR, &extractor)
            .await
            .map_err(fetch_error)?;

        let html = match value {
            Value::String(html) => html,
            _ => {
                return Err(fetch_error(PageError::ElementNotFound {
                    selector: CONTENT_SELECTOR.to_string(),
                }))
            }
        };

        let snapshot = ContentSnapshot::new(strip_scripts(&html));
        debug!(
            "Fetched {} ({} bytes) in {}ms",
            id,
            snapshot.len(),
            start_time.elapsed().as_millis()
        );
        Ok(snapshot)
    }

    /// Human-readable title of the meeting currently shown in the detail view.
    pub async fn fetch_header(&self, session: &dyn PageSession, id: &ContentId) -> Result<String> {
        let extractor = format!(
            "e => {{ const h = e.querySelector({}) || e.querySelector({}); return h ? h.textContent : null; }}",
            js_string(TITLE_SELECTOR),
            js_string(HEADING_SELECTOR)
        );
        let value = session
            .extract(CONTENT_SELECTOR, &extractor)
            .await
            .map_err(|e| WatchError::HeaderExtraction {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        match value.as_str().map(str::trim) {
            Some(header) if !header.is_empty() => Ok(header.to_string()),
            _ => Err(WatchError::HeaderExtraction {
                id: id.clone(),
                reason: "no heading element".to_string(),
            }),
        }
    }
}

pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
