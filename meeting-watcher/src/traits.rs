use crate::types::{OutboundMessage, PageError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// A single browser page the watcher drives. Operations are issued one at a time
/// by whoever owns the session.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Load `url` and wait for the document to finish loading.
    async fn navigate(&self, url: &str) -> std::result::Result<(), PageError>;

    /// Wait until `selector` matches an element, or fail after `timeout_ms`.
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> std::result::Result<(), PageError>;

    async fn click(&self, selector: &str) -> std::result::Result<(), PageError>;

    /// Run `extractor` (a JavaScript function taking one element) against the first
    /// element matching `selector` and return its JSON-serializable result.
    async fn extract(&self, selector: &str, extractor: &str) -> std::result::Result<Value, PageError>;

    /// Release the underlying browser.
    async fn close(&self) -> std::result::Result<(), PageError>;
}

/// Outbound mail capability
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    fn name(&self) -> &str;
}
