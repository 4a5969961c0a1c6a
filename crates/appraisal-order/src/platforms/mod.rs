use crate::{AutomationError, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod cdp_client;
pub mod chrome;

pub use chrome::{BrowserOptions, ChromeLauncher};

/// The ways an element's displayed value can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextChannel {
    /// Computed `content` of the `::before`/`::after` pseudo-elements
    GeneratedContent,
    /// `innerText`: what a user sees, layout-aware
    RenderedText,
    /// Raw `textContent` including hidden nodes
    TextContent,
    /// Text of a DOM range spanning the element's full contents
    RangeText,
}

/// The common trait that every remote document driver must implement.
///
/// A single engine instance is owned by exactly one run; callers never issue
/// overlapping operations against it.
#[async_trait::async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Navigate the document to `url`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AutomationError>;

    /// Wait until the document reports it finished loading.
    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), AutomationError>;

    /// Whether an element matching the selector is currently attached.
    async fn exists(&self, selector: &Selector) -> Result<bool, AutomationError>;

    /// Replace a text control's value, firing input/change events.
    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError>;

    /// Select the option whose value equals `value`.
    async fn select_option(&self, selector: &Selector, value: &str)
        -> Result<(), AutomationError>;

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError>;

    /// Read one text channel. `Ok(None)` means the channel is empty or absent.
    async fn read_channel(
        &self,
        selector: &Selector,
        channel: TextChannel,
    ) -> Result<Option<String>, AutomationError>;

    /// PNG bytes of the current viewport.
    async fn capture_screenshot(&self) -> Result<Vec<u8>, AutomationError>;

    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Release the document and any process backing it. Must be safe to call twice.
    async fn close(&self) -> Result<(), AutomationError>;
}

/// Produces a fresh engine for one run.
#[async_trait::async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, AutomationError>;
}
