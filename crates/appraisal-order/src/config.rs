//! The single flat configuration object a run is invoked with.
//!
//! Known keys configure the session; every other key is a field value looked
//! up by the pipeline through each step's accepted keys.

use crate::duration_parser::{deserialize_duration, deserialize_optional_duration};
use crate::errors::ConfigError;
use crate::platforms::BrowserOptions;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_headless() -> bool {
    true
}
fn default_run_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_navigation_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_page_settle() -> Duration {
    Duration::from_secs(1)
}
fn default_auth_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_post_login_wait() -> Duration {
    Duration::from_secs(2)
}
fn default_form_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_fee_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_fee_settle_delay() -> Duration {
    Duration::from_secs(3)
}
fn default_strategy_timeout() -> Duration {
    Duration::from_secs(2)
}

#[derive(Clone, Deserialize)]
pub struct RunConfig {
    #[serde(alias = "targetUrl", alias = "url")]
    pub target_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Wall-clock bound on the whole run, acquisition to teardown.
    #[serde(
        default = "default_run_timeout",
        alias = "runTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub run_timeout: Duration,
    #[serde(
        default = "default_navigation_timeout",
        alias = "navigationTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub navigation_timeout: Duration,
    /// Pause after the entry point loads, before looking for any control.
    #[serde(
        default = "default_page_settle",
        alias = "wait_time",
        deserialize_with = "deserialize_duration"
    )]
    pub page_settle: Duration,
    #[serde(
        default = "default_auth_timeout",
        alias = "authTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub auth_timeout: Duration,
    #[serde(
        default = "default_post_login_wait",
        alias = "postLoginWait",
        deserialize_with = "deserialize_duration"
    )]
    pub post_login_wait: Duration,
    #[serde(
        default = "default_form_timeout",
        alias = "formTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub form_timeout: Duration,
    /// Replaces every step's own control-appearance timeout when set.
    #[serde(
        default,
        alias = "stepTimeout",
        deserialize_with = "deserialize_optional_duration"
    )]
    pub step_timeout: Option<Duration>,
    #[serde(
        default = "default_fee_settle_delay",
        alias = "feeSettleDelay",
        deserialize_with = "deserialize_duration"
    )]
    pub fee_settle_delay: Duration,
    #[serde(
        default = "default_fee_timeout",
        alias = "feeTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fee_timeout: Duration,
    #[serde(
        default = "default_strategy_timeout",
        alias = "strategyTimeout",
        deserialize_with = "deserialize_duration"
    )]
    pub strategy_timeout: Duration,

    #[serde(default, alias = "formScreenshot")]
    pub form_screenshot: Option<PathBuf>,
    #[serde(default, alias = "feeScreenshot", alias = "screenshot_path")]
    pub fee_screenshot: Option<PathBuf>,

    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub debug_port: Option<u16>,
    #[serde(default)]
    pub cdp_endpoint: Option<String>,

    /// Everything else: per-field values keyed by config key.
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("target_url", &self.target_url)
            .field("authenticated", &self.credentials().is_some())
            .field("headless", &self.headless)
            .field("run_timeout", &self.run_timeout)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A non-blank username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RunConfig {
    /// A config with every setting at its default.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            username: None,
            password: None,
            headless: default_headless(),
            run_timeout: default_run_timeout(),
            navigation_timeout: default_navigation_timeout(),
            page_settle: default_page_settle(),
            auth_timeout: default_auth_timeout(),
            post_login_wait: default_post_login_wait(),
            form_timeout: default_form_timeout(),
            step_timeout: None,
            fee_settle_delay: default_fee_settle_delay(),
            fee_timeout: default_fee_timeout(),
            strategy_timeout: default_strategy_timeout(),
            form_screenshot: None,
            fee_screenshot: None,
            chrome_path: None,
            debug_port: None,
            cdp_endpoint: None,
            values: BTreeMap::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_value(serde_yaml::from_str(text)?)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_value(load_value(path.as_ref())?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.target_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Missing("target_url".to_string()));
        }
        reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
            key: "target_url".to_string(),
            reason: e.to_string(),
        })?;
        if self.run_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "run_timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Both halves present and non-blank, or nothing.
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        if username.is_empty() || password.trim().is_empty() {
            return None;
        }
        Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// The value under the first of `keys` that is present and not null.
    /// Numbers and booleans are stringified.
    pub fn value_for<S: AsRef<str>>(&self, keys: &[S]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.values.get(key.as_ref()))
            .find_map(stringify)
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            chrome_path: self.chrome_path.clone(),
            headless: self.headless,
            debug_port: self.debug_port,
            cdp_endpoint: self.cdp_endpoint.clone(),
            ..BrowserOptions::default()
        }
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Read a config file into a JSON value without interpreting it, so callers
/// can layer overrides before building a [`RunConfig`].
pub fn load_value(path: &Path) -> Result<Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        Ok(serde_yaml::from_str(&text)?)
    } else {
        Ok(serde_json::from_str(&text)?)
    }
}

/// Shallow merge: top-level keys of `overlay` replace those of `base`.
pub fn merge_values(base: Value, overlay: Value) -> Result<Value, ConfigError> {
    let mut merged = into_object(base, "config")?;
    merged.extend(into_object(overlay, "overrides")?);
    Ok(Value::Object(merged))
}

fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ConfigError::InvalidValue {
            key: what.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}
