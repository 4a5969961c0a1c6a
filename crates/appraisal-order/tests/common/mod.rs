//! Scripted in-memory document used by the integration tests.
#![allow(dead_code)]

use appraisal_order::{
    AutomationError, DocumentEngine, EngineLauncher, FormDefinition, RunConfig, Selector,
    TextChannel,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TARGET_URL: &str = "https://orders.example.com/Login.aspx";

#[derive(Default)]
struct State {
    present: HashSet<Selector>,
    /// Controls that appear once the key control is clicked.
    reveals: HashMap<Selector, Vec<Selector>>,
    /// Allowed option values per select; unrestricted when absent.
    options: HashMap<Selector, Vec<String>>,
    fee_selector: Option<Selector>,
    channels: HashMap<TextChannel, String>,
    read_delays: HashMap<TextChannel, Duration>,
    fail_navigation: bool,
    fail_screenshot: bool,
    navigate_delay: Duration,

    navigations: Vec<String>,
    fills: Vec<(Selector, String)>,
    selections: Vec<(Selector, String)>,
    clicks: Vec<Selector>,
    reads: HashMap<TextChannel, usize>,
    closes: usize,
}

/// A document whose controls and fee channels are set up by the test.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every control of `form` present, fee element absent.
    pub fn with_form(form: &FormDefinition) -> Self {
        let engine = Self::new();
        {
            let mut state = engine.state.lock().unwrap();
            state.present.insert(form.form_ready.clone());
            for step in &form.steps {
                state.present.insert(step.selector.clone());
            }
        }
        engine
    }

    pub fn show(self, selectors: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.present.extend(selectors.iter().map(|s| Selector::from(*s)));
        }
        self
    }

    pub fn hide(self, selector: &Selector) -> Self {
        self.state.lock().unwrap().present.remove(selector);
        self
    }

    pub fn reveal_on_click(self, clicked: &Selector, revealed: &[Selector]) -> Self {
        self.state
            .lock()
            .unwrap()
            .reveals
            .insert(clicked.clone(), revealed.to_vec());
        self
    }

    pub fn with_options(self, selector: &Selector, options: &[&str]) -> Self {
        self.state.lock().unwrap().options.insert(
            selector.clone(),
            options.iter().map(|o| o.to_string()).collect(),
        );
        self
    }

    /// Make the fee element present and expose `value` through `channel`.
    pub fn with_fee(self, selector: &Selector, channel: TextChannel, value: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.present.insert(selector.clone());
            state.fee_selector = Some(selector.clone());
            state.channels.insert(channel, value.to_string());
        }
        self
    }

    /// Make every read of `channel` take `delay` before answering.
    pub fn slow_channel(self, channel: TextChannel, delay: Duration) -> Self {
        self.state.lock().unwrap().read_delays.insert(channel, delay);
        self
    }

    pub fn failing_navigation(self) -> Self {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn failing_screenshot(self) -> Self {
        self.state.lock().unwrap().fail_screenshot = true;
        self
    }

    pub fn slow_navigation(self, delay: Duration) -> Self {
        self.state.lock().unwrap().navigate_delay = delay;
        self
    }

    pub fn reads(&self, channel: TextChannel) -> usize {
        *self.state.lock().unwrap().reads.get(&channel).unwrap_or(&0)
    }

    pub fn total_reads(&self) -> usize {
        self.state.lock().unwrap().reads.values().sum()
    }

    pub fn fills(&self) -> Vec<(Selector, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn selections(&self) -> Vec<(Selector, String)> {
        self.state.lock().unwrap().selections.clone()
    }

    pub fn clicks(&self) -> Vec<Selector> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn applied(&self, selector: &Selector) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .fills
            .iter()
            .chain(state.selections.iter())
            .rev()
            .find(|(s, _)| s == selector)
            .map(|(_, v)| v.clone())
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn require(&self, selector: &Selector) -> Result<(), AutomationError> {
        if self.state.lock().unwrap().present.contains(selector) {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(selector.to_string()))
        }
    }
}

#[async_trait::async_trait]
impl DocumentEngine for FakeEngine {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), AutomationError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.navigations.push(url.to_string());
            if state.fail_navigation {
                return Err(AutomationError::PlatformError(
                    "net::ERR_NAME_NOT_RESOLVED".to_string(),
                ));
            }
            state.navigate_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn wait_until_ready(&self, _timeout: Duration) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn exists(&self, selector: &Selector) -> Result<bool, AutomationError> {
        if let Selector::Invalid(reason) = selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        Ok(self.state.lock().unwrap().present.contains(selector))
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        self.require(selector)?;
        self.state
            .lock()
            .unwrap()
            .fills
            .push((selector.clone(), value.to_string()));
        Ok(())
    }

    async fn select_option(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        self.require(selector)?;
        let mut state = self.state.lock().unwrap();
        if let Some(options) = state.options.get(selector) {
            if !options.iter().any(|o| o == value) {
                return Err(AutomationError::OptionNotAvailable(format!(
                    "{value} not offered by {selector}"
                )));
            }
        }
        state.selections.push((selector.clone(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        self.require(selector)?;
        let mut state = self.state.lock().unwrap();
        state.clicks.push(selector.clone());
        if let Some(revealed) = state.reveals.get(selector).cloned() {
            state.present.extend(revealed);
        }
        Ok(())
    }

    async fn read_channel(
        &self,
        selector: &Selector,
        channel: TextChannel,
    ) -> Result<Option<String>, AutomationError> {
        self.require(selector)?;
        let (delay, value) = {
            let mut state = self.state.lock().unwrap();
            *state.reads.entry(channel).or_default() += 1;
            let value = if state.fee_selector.as_ref() == Some(selector) {
                state.channels.get(&channel).cloned()
            } else {
                None
            };
            (state.read_delays.get(&channel).copied(), value)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(value)
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        if self.state.lock().unwrap().fail_screenshot {
            return Err(AutomationError::PlatformError("capture refused".to_string()));
        }
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .navigations
            .last()
            .cloned()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Hands out the same fake engine on every launch.
pub struct FakeLauncher {
    pub engine: Arc<FakeEngine>,
}

impl FakeLauncher {
    pub fn new(engine: Arc<FakeEngine>) -> Arc<Self> {
        Arc::new(Self { engine })
    }
}

#[async_trait::async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, AutomationError> {
        Ok(self.engine.clone() as Arc<dyn DocumentEngine>)
    }
}

pub struct BrokenLauncher;

#[async_trait::async_trait]
impl EngineLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, AutomationError> {
        Err(AutomationError::PlatformError(
            "No Chromium-family browser found".to_string(),
        ))
    }
}

/// Config pointing at the fake target with every field populated.
pub fn full_config() -> RunConfig {
    let mut config = RunConfig::new(TARGET_URL);
    for (key, value) in [
        ("transactionType", "Purchase"),
        ("loanType", "Conventional"),
        ("loanNumber", "LN-20931"),
        ("borrower", "Jane Doe"),
        ("propertyType", "Single Family Residential"),
        ("address", "12 Ocean Ave"),
        ("city", "Middletown"),
        ("state", "NJ"),
        ("zip", "07751"),
        ("occupancy", "Investment"),
        ("contact_person", "Agent"),
        ("other_access_instructions", "Lockbox on side door"),
        ("agent_name", "Sam Lee"),
        ("product", "59"),
        ("date_appraisal_needed", "11/02/2026"),
    ] {
        config.set_value(key, value);
    }
    config
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
