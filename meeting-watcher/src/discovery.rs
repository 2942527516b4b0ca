use crate::fetcher::js_string;
use crate::traits::PageSession;
use crate::types::{ContentId, MonitorConfig, Result, TrackedSequence, WatchError};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const YEAR_BUTTON_SELECTOR: &str = ".fc-year-button";
pub const YEAR_CALENDAR_SELECTOR: &str = "#year-calendar";
pub const CONTENT_MARKER_SELECTOR: &str = ".fc-content";

/// Finds the meetings to watch on the calendar's year view.
pub struct ContentIdDiscovery {
    config: MonitorConfig,
}

impl ContentIdDiscovery {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }

    /// Cell selector for the tracked committee categories, e.g.
    /// `td[data-utvalg="BYST"], td[data-utvalg="FORM"]`.
    pub fn category_selector(&self) -> String {
        self.config
            .categories
            .iter()
            .map(|code| format!("td[data-utvalg=\"{}\"]", code))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub async fn discover(&self, session: &dyn PageSession) -> Result<TrackedSequence> {
        let timeout_ms = self.config.wait_timeout_ms;

        info!("Discovering meetings at {}", self.config.base_url);
        session.navigate(&self.config.base_url).await?;

        // All meetings are only in the DOM at once in the year view
        session.wait_for_selector(YEAR_BUTTON_SELECTOR, timeout_ms).await?;
        session.click(YEAR_BUTTON_SELECTOR).await?;
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        session.wait_for_selector(YEAR_CALENDAR_SELECTOR, timeout_ms).await?;
        session.wait_for_selector(CONTENT_MARKER_SELECTOR, timeout_ms).await?;

        let extractor = format!(
            r#"e => {{
                const ids = [];
                e.querySelectorAll({cells}).forEach(td => {{
                    td.querySelectorAll({marker}).forEach(content => {{
                        ids.push(content.getAttribute('id'));
                    }});
                }});
                return ids;
            }}"#,
            cells = js_string(&self.category_selector()),
            marker = js_string(CONTENT_MARKER_SELECTOR),
        );
        let value = session.extract(YEAR_CALENDAR_SELECTOR, &extractor).await?;

        let ids = parse_ids(value)?;
        debug!("Discovered ids: {:?}", ids);
        info!("Found {} meetings to watch", ids.len());

        TrackedSequence::new(ids)
    }
}

/// Keeps document order and duplicates; markers without an id are skipped.
fn parse_ids(value: Value) -> Result<Vec<ContentId>> {
    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            return Err(WatchError::Discovery(format!(
                "Expected a list of identifiers, got {}",
                other
            )))
        }
    };

    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_str().map(str::trim) {
            Some(id) if !id.is_empty() => ids.push(ContentId::new(id)),
            _ => warn!("Skipping content marker without id: {}", entry),
        }
    }
    Ok(ids)
}
