//! Chromium-family browser driven over the DevTools protocol.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::cdp_client::{CdpConnection, CdpEndpoint};
use super::{DocumentEngine, EngineLauncher, TextChannel};
use crate::{AutomationError, Selector};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

const EXECUTABLE_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
    "microsoft-edge",
];

#[cfg(target_os = "macos")]
const APP_BUNDLE_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

#[cfg(not(target_os = "macos"))]
const APP_BUNDLE_PATHS: &[&str] = &[];

/// How to obtain a browser for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Browser binary. Searched on `PATH` when absent.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Fixed DevTools port; the browser binds a free one when absent.
    pub debug_port: Option<u16>,
    /// Attach to an already running browser instead of launching one.
    pub cdp_endpoint: Option<String>,
    #[serde(
        deserialize_with = "crate::duration_parser::deserialize_duration",
        serialize_with = "crate::duration_parser::serialize_duration"
    )]
    pub launch_timeout: Duration,
    #[serde(
        deserialize_with = "crate::duration_parser::deserialize_duration",
        serialize_with = "crate::duration_parser::serialize_duration"
    )]
    pub call_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            debug_port: None,
            cdp_endpoint: None,
            launch_timeout: Duration::from_secs(20),
            call_timeout: Duration::from_secs(30),
            extra_args: Vec::new(),
        }
    }
}

impl BrowserOptions {
    fn launch_args(&self, port: u16, profile_dir: &Path) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={port}"),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-popup-blocking".to_string(),
            "--window-size=1366,900".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("about:blank".to_string());
        args
    }
}

/// Launches (or attaches to) a browser and opens one page per run.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    options: BrowserOptions,
}

impl ChromeLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn resolve_executable(&self) -> Result<PathBuf, AutomationError> {
        if let Some(path) = &self.options.chrome_path {
            return Ok(path.clone());
        }
        if let Some(path) = std::env::var_os("CHROME_PATH") {
            return Ok(PathBuf::from(path));
        }
        let path_var = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path_var) {
            for name in EXECUTABLE_CANDIDATES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
                #[cfg(target_os = "windows")]
                {
                    let exe = dir.join(format!("{name}.exe"));
                    if exe.is_file() {
                        return Ok(exe);
                    }
                }
            }
        }
        APP_BUNDLE_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| {
                AutomationError::PlatformError(
                    "No Chromium-family browser found; set chrome_path or CHROME_PATH".into(),
                )
            })
    }

    async fn attach(&self, endpoint_url: &str) -> Result<ChromeEngine, AutomationError> {
        let endpoint = CdpEndpoint::new(endpoint_url);
        endpoint.wait_available(self.options.launch_timeout).await?;
        let page = endpoint.new_page().await?;
        let ws_url = page.websocket_url.clone().ok_or_else(|| {
            AutomationError::PlatformError(format!("Page {} has no debugger url", page.id))
        })?;
        let connection = CdpConnection::connect(&ws_url, self.options.call_timeout).await?;
        info!(endpoint = %endpoint.base_url(), page = %page.id, "Attached to running browser");
        Ok(ChromeEngine {
            connection,
            endpoint,
            page_id: page.id,
            child: Mutex::new(None),
            profile_dir: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    async fn spawn(&self) -> Result<ChromeEngine, AutomationError> {
        let executable = self.resolve_executable()?;
        // Port 0 lets the browser bind a free port and report it in the profile.
        let requested_port = self.options.debug_port.unwrap_or(0);
        let profile_dir = tempfile::Builder::new()
            .prefix("appraisal-order-profile-")
            .tempdir()
            .map_err(|e| AutomationError::PlatformError(format!("profile dir: {e}")))?;

        let args = self.options.launch_args(requested_port, profile_dir.path());
        debug!(executable = %executable.display(), ?args, "Spawning browser");
        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AutomationError::PlatformError(format!(
                    "Failed to start {}: {e}",
                    executable.display()
                ))
            })?;

        let port = if requested_port != 0 {
            requested_port
        } else {
            match wait_for_active_port(profile_dir.path(), self.options.launch_timeout).await {
                Ok(port) => port,
                Err(e) => {
                    let _ = child.kill().await;
                    return Err(e);
                }
            }
        };

        let endpoint = CdpEndpoint::local(port);
        if let Err(e) = endpoint.wait_available(self.options.launch_timeout).await {
            let _ = child.kill().await;
            return Err(e);
        }

        let page = match endpoint.first_page().await? {
            Some(page) => page,
            None => endpoint.new_page().await?,
        };
        let ws_url = page.websocket_url.clone().ok_or_else(|| {
            AutomationError::PlatformError(format!("Page {} has no debugger url", page.id))
        })?;
        let connection = match CdpConnection::connect(&ws_url, self.options.call_timeout).await {
            Ok(c) => c,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };
        info!(pid = ?child.id(), port, headless = self.options.headless, "Browser launched");

        Ok(ChromeEngine {
            connection,
            endpoint,
            page_id: page.id,
            child: Mutex::new(Some(child)),
            profile_dir: Mutex::new(Some(profile_dir)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait::async_trait]
impl EngineLauncher for ChromeLauncher {
    #[instrument(level = "debug", skip(self))]
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, AutomationError> {
        let engine = match &self.options.cdp_endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => self.attach(endpoint).await?,
            _ => self.spawn().await?,
        };
        Ok(Arc::new(engine))
    }
}

/// The port from a `DevToolsActivePort` file: port on the first line, browser
/// target path on the second.
fn parse_active_port(contents: &str) -> Option<u16> {
    contents
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
}

/// Wait for the browser to write the port it bound into its profile dir.
async fn wait_for_active_port(profile_dir: &Path, timeout: Duration) -> Result<u16, AutomationError> {
    let file = profile_dir.join("DevToolsActivePort");
    let start = tokio::time::Instant::now();
    loop {
        // The file can be observed half-written; retry until the port parses.
        if let Ok(contents) = tokio::fs::read_to_string(&file).await {
            if let Some(port) = parse_active_port(&contents) {
                return Ok(port);
            }
        }
        if start.elapsed() >= timeout {
            return Err(AutomationError::Timeout(format!(
                "browser did not report its DevTools port within {timeout:?}"
            )));
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// One page in a launched or attached browser.
pub struct ChromeEngine {
    connection: CdpConnection,
    endpoint: CdpEndpoint,
    page_id: String,
    /// `Some` only when this engine launched the browser itself.
    child: Mutex<Option<Child>>,
    profile_dir: Mutex<Option<tempfile::TempDir>>,
    closed: AtomicBool,
}

impl ChromeEngine {
    /// Runs `body` with `el` bound to the selected element. `body` must
    /// evaluate to `{value}`, `{error}` or `{unavailable}`.
    async fn on_element(&self, selector: &Selector, body: &str) -> Result<Value, AutomationError> {
        let lookup = selector.to_js_lookup()?;
        let script = format!(
            "(() => {{ const el = {lookup}; if (!el) {{ return {{ missing: true }}; }} {body} }})()"
        );
        let outcome = self.connection.evaluate(&script).await?;

        if outcome.get("missing").and_then(Value::as_bool) == Some(true) {
            return Err(AutomationError::ElementNotFound(selector.to_string()));
        }
        if let Some(error) = outcome.get("error").and_then(Value::as_str) {
            return Err(AutomationError::PlatformError(format!("{selector}: {error}")));
        }
        if let Some(options) = outcome.get("unavailable") {
            return Err(AutomationError::OptionNotAvailable(format!(
                "{selector} offers {options}"
            )));
        }
        Ok(outcome.get("value").cloned().unwrap_or(Value::Null))
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn channel_body(channel: TextChannel) -> &'static str {
    match channel {
        TextChannel::GeneratedContent => {
            "const pick = (p) => { const c = getComputedStyle(el, p).getPropertyValue('content'); \
             return (c && c !== 'none' && c !== 'normal') ? c : null; }; \
             return { value: pick('::before') ?? pick('::after') };"
        }
        TextChannel::RenderedText => "return { value: el.innerText };",
        TextChannel::TextContent => "return { value: el.textContent };",
        TextChannel::RangeText => {
            "const range = document.createRange(); range.selectNodeContents(el); \
             return { value: range.toString() };"
        }
    }
}

#[async_trait::async_trait]
impl DocumentEngine for ChromeEngine {
    #[instrument(level = "debug", skip(self))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AutomationError> {
        let response = self
            .connection
            .call_with_timeout("Page.navigate", json!({ "url": url }), timeout)
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(Value::as_str) {
            return Err(AutomationError::PlatformError(format!(
                "Navigation to {url} failed: {error_text}"
            )));
        }
        self.wait_until_ready(timeout).await
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<(), AutomationError> {
        let start = tokio::time::Instant::now();
        loop {
            // Evaluation can fail while the old document is being torn down.
            match self.connection.evaluate("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" => return Ok(()),
                Ok(_) => {}
                Err(AutomationError::SessionClosed(reason)) => {
                    return Err(AutomationError::SessionClosed(reason))
                }
                Err(e) => debug!("readyState probe failed: {}", e),
            }
            if start.elapsed() >= timeout {
                return Err(AutomationError::Timeout(format!(
                    "document not ready after {timeout:?}"
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn exists(&self, selector: &Selector) -> Result<bool, AutomationError> {
        let lookup = selector.to_js_lookup()?;
        let value = self.connection.evaluate(&format!("!!({lookup})")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), AutomationError> {
        let body = format!(
            "if (el.disabled || el.readOnly) {{ return {{ error: 'control is not editable' }}; }} \
             const v = {value}; \
             if (el.focus) {{ el.focus(); }} \
             const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; \
             const desc = Object.getOwnPropertyDescriptor(proto, 'value'); \
             if (desc && desc.set && (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) {{ desc.set.call(el, v); }} else {{ el.value = v; }} \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             if (el.blur) {{ el.blur(); }} \
             return {{ value: el.value }};",
            value = js_string(value)
        );
        self.on_element(selector, &body).await.map(|_| ())
    }

    async fn select_option(
        &self,
        selector: &Selector,
        value: &str,
    ) -> Result<(), AutomationError> {
        let body = format!(
            "if (el.tagName !== 'SELECT') {{ return {{ error: 'not a select element' }}; }} \
             const v = {value}; \
             const options = Array.from(el.options); \
             if (!options.some(o => o.value === v)) {{ return {{ unavailable: options.map(o => o.value) }}; }} \
             el.value = v; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return {{ value: el.value }};",
            value = js_string(value)
        );
        self.on_element(selector, &body).await.map(|_| ())
    }

    async fn click(&self, selector: &Selector) -> Result<(), AutomationError> {
        let body = "if (el.scrollIntoView) { el.scrollIntoView({ block: 'center' }); } \
                    el.click(); return { value: true };";
        self.on_element(selector, body).await.map(|_| ())
    }

    async fn read_channel(
        &self,
        selector: &Selector,
        channel: TextChannel,
    ) -> Result<Option<String>, AutomationError> {
        let value = self.on_element(selector, channel_body(channel)).await?;
        Ok(match value {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }

    async fn capture_screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        let response = self
            .connection
            .call(
                "Page.captureScreenshot",
                json!({ "format": "png", "captureBeyondViewport": true }),
            )
            .await?;
        let data = response
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| AutomationError::PlatformError("screenshot without data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| AutomationError::PlatformError(format!("screenshot decode: {e}")))
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        let value = self.connection.evaluate("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), AutomationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut child_guard = self.child.lock().await;
        match child_guard.as_mut() {
            Some(child) => {
                let _ = self
                    .connection
                    .call_with_timeout("Browser.close", json!({}), Duration::from_secs(2))
                    .await;
                self.connection.shutdown();
                if let Err(e) = child.kill().await {
                    // Already exited after Browser.close.
                    debug!("browser kill: {}", e);
                }
                info!("Browser process closed");
            }
            None => {
                self.connection.shutdown();
                if let Err(e) = self.endpoint.close_page(&self.page_id).await {
                    warn!("Failed to close attached page {}: {}", self.page_id, e);
                }
                info!(page = %self.page_id, "Attached page closed");
            }
        }
        *child_guard = None;
        self.profile_dir.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_launch_args() {
        let options = BrowserOptions {
            headless: true,
            extra_args: vec!["--no-sandbox".to_string()],
            ..Default::default()
        };
        let args = options.launch_args(9333, Path::new("/tmp/profile"));
        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_visible_launch_args_have_no_headless_flag() {
        let options = BrowserOptions {
            headless: false,
            ..Default::default()
        };
        let args = options.launch_args(9333, Path::new("/tmp/profile"));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_explicit_chrome_path_wins() {
        let launcher = ChromeLauncher::new(BrowserOptions {
            chrome_path: Some(PathBuf::from("/opt/chrome/chrome")),
            ..Default::default()
        });
        assert_eq!(
            launcher.resolve_executable().unwrap(),
            PathBuf::from("/opt/chrome/chrome")
        );
    }

    #[test]
    fn test_browser_options_accept_duration_strings() {
        let options: BrowserOptions =
            serde_json::from_str(r#"{"headless": false, "launch_timeout": "45s"}"#).unwrap();
        assert!(!options.headless);
        assert_eq!(options.launch_timeout, Duration::from_secs(45));
        assert_eq!(options.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_active_port() {
        assert_eq!(
            parse_active_port("40213\n/devtools/browser/6f1c2d\n"),
            Some(40213)
        );
        assert_eq!(parse_active_port(""), None);
        assert_eq!(parse_active_port("0\n"), None);
        assert_eq!(parse_active_port("40\u{0}"), None);
    }

    #[tokio::test]
    async fn test_active_port_read_from_profile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("DevToolsActivePort"),
            "9411\n/devtools/browser/abc",
        )
        .unwrap();
        let port = wait_for_active_port(dir.path(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(port, 9411);
    }

    #[tokio::test]
    async fn test_missing_active_port_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let result = wait_for_active_port(dir.path(), Duration::from_millis(250)).await;
        assert!(matches!(result, Err(AutomationError::Timeout(_))));
    }

    #[test]
    fn test_range_channel_reads_text_not_markup() {
        let body = channel_body(TextChannel::RangeText);
        assert!(body.contains("range.toString()"));
        assert!(!body.contains("innerHTML"));
    }
}
