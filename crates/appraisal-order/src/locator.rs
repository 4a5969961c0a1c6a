use tracing::{debug, instrument};

use crate::errors::AutomationError;
use crate::platforms::{DocumentEngine, TextChannel};
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handle for finding and interacting with one control of the remote document
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn DocumentEngine>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
}

impl Locator {
    /// Create a new locator with the given selector
    pub fn new(engine: Arc<dyn DocumentEngine>, selector: impl Into<Selector>) -> Self {
        Self {
            engine,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Wait for a matching element to be attached, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<(), AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let start = tokio::time::Instant::now();

        loop {
            match self.engine.exists(&self.selector).await {
                Ok(true) => {
                    debug!(
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Element appeared"
                    );
                    return Ok(());
                }
                Ok(false) => {}
                // A bad selector or a dead session will not fix itself by waiting.
                Err(e @ AutomationError::InvalidSelector(_))
                | Err(e @ AutomationError::SessionClosed(_)) => return Err(e),
                Err(e) => debug!("existence probe failed: {}", e),
            }

            if start.elapsed() >= effective_timeout {
                return Err(AutomationError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {}",
                    self.selector
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn fill(&self, value: &str) -> Result<(), AutomationError> {
        self.engine.fill(&self.selector, value).await
    }

    pub async fn select_option(&self, value: &str) -> Result<(), AutomationError> {
        self.engine.select_option(&self.selector, value).await
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        self.engine.click(&self.selector).await
    }

    /// Read one text channel, bounded by `timeout`.
    pub async fn read(
        &self,
        channel: TextChannel,
        timeout: Duration,
    ) -> Result<Option<String>, AutomationError> {
        tokio::time::timeout(timeout, self.engine.read_channel(&self.selector, channel))
            .await
            .map_err(|_| {
                AutomationError::Timeout(format!(
                    "Reading {channel:?} of {} took longer than {timeout:?}",
                    self.selector
                ))
            })?
    }
}
