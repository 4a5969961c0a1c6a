//! Lightweight Chrome DevTools Protocol client.
//!
//! Discovery goes through the DevTools HTTP endpoint (`/json/version`,
//! `/json/list`); commands travel over the page's websocket, correlated by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::AutomationError;

type CdpResult = Result<Value, String>;
type PendingMap = HashMap<u64, oneshot::Sender<CdpResult>>;
type Pending = Arc<Mutex<PendingMap>>;

const AVAILABILITY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// HTTP side of a DevTools endpoint, e.g. `http://127.0.0.1:9222`.
#[derive(Debug, Clone)]
pub struct CdpEndpoint {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub websocket_url: Option<String>,
}

impl CdpEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn local(debug_port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{debug_port}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if a browser is listening with DevTools enabled
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/json/version", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Poll until the endpoint answers or `timeout` elapses.
    pub async fn wait_available(&self, timeout: Duration) -> Result<(), AutomationError> {
        let start = tokio::time::Instant::now();
        loop {
            if self.is_available().await {
                debug!(
                    endpoint = %self.base_url,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "DevTools endpoint available"
                );
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(AutomationError::Timeout(format!(
                    "DevTools endpoint {} did not answer within {timeout:?}",
                    self.base_url
                )));
            }
            tokio::time::sleep(AVAILABILITY_POLL_INTERVAL).await;
        }
    }

    /// Get list of all open targets
    pub async fn get_tabs(&self) -> Result<Vec<TabInfo>, AutomationError> {
        let response = self
            .client
            .get(format!("{}/json/list", self.base_url))
            .send()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get tabs: {e}")))?;

        let tabs: Vec<TabInfo> = response
            .json()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to parse tabs: {e}")))?;

        debug!("Found {} open targets", tabs.len());
        Ok(tabs)
    }

    /// Open a fresh page target.
    pub async fn new_page(&self) -> Result<TabInfo, AutomationError> {
        // Recent Chrome builds reject GET on /json/new.
        let response = self
            .client
            .put(format!("{}/json/new?about:blank", self.base_url))
            .send()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to open page: {e}")))?;

        let tab: TabInfo = response
            .json()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to parse page: {e}")))?;
        Ok(tab)
    }

    /// First existing page target with a debugger websocket, if any.
    pub async fn first_page(&self) -> Result<Option<TabInfo>, AutomationError> {
        let tabs = self.get_tabs().await?;
        Ok(tabs
            .into_iter()
            .find(|t| t.kind == "page" && t.websocket_url.is_some()))
    }

    pub async fn close_page(&self, id: &str) -> Result<(), AutomationError> {
        self.client
            .get(format!("{}/json/close/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| AutomationError::PlatformError(format!("Failed to close page: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CdpRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CdpIncoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
    method: Option<String>,
}

/// One websocket session with a page target.
pub struct CdpConnection {
    sender: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str, call_timeout: Duration) -> Result<Self, AutomationError> {
        let (ws_stream, _) = connect_async(ws_url).await.map_err(|e| {
            AutomationError::PlatformError(format!("Failed to connect to {ws_url}: {e}"))
        })?;
        info!(%ws_url, "Connected to page target");

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("CDP send error: {}", e);
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                match serde_json::from_str::<CdpIncoming>(&txt) {
                    Ok(CdpIncoming {
                        id: Some(id),
                        result,
                        error,
                        ..
                    }) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(match error {
                                Some(err) => Err(format!("{} ({})", err.message, err.code)),
                                None => Ok(result.unwrap_or(Value::Null)),
                            });
                        }
                    }
                    Ok(CdpIncoming {
                        method: Some(method),
                        ..
                    }) => {
                        if method == "Inspector.detached" || method == "Inspector.targetCrashed" {
                            warn!(%method, "Page target went away");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Invalid CDP message: {}", e),
                }
            }
            // Dropping the senders wakes every waiter with a cancellation.
            let mut pending = reader_pending.lock().await;
            if !pending.is_empty() {
                warn!(
                    "CDP connection closed with {} pending calls",
                    pending.len()
                );
            }
            pending.clear();
        });

        Ok(Self {
            sender: tx,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
            reader,
            writer,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished() || self.sender.is_closed()
    }

    /// Send one command and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, AutomationError> {
        self.call_with_timeout(method, params, self.call_timeout)
            .await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AutomationError> {
        if self.is_closed() {
            return Err(AutomationError::SessionClosed(format!(
                "cannot send {method}: connection closed"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<CdpResult>();
        self.pending.lock().await.insert(id, tx);

        let payload = serde_json::to_string(&CdpRequest { id, method, params })
            .map_err(|e| AutomationError::Internal(format!("CDP serialize: {e}")))?;
        if self.sender.send(Message::Text(payload)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AutomationError::SessionClosed(format!(
                "cannot send {method}: writer stopped"
            )));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(AutomationError::PlatformError(format!(
                "{method} failed: {message}"
            ))),
            Ok(Err(_canceled)) => Err(AutomationError::SessionClosed(format!(
                "connection closed while waiting for {method}"
            ))),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                Err(AutomationError::Timeout(format!(
                    "{method} did not answer within {timeout:?}"
                )))
            }
        }
    }

    /// Evaluate an expression in the page and return its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, AutomationError> {
        let response = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        evaluation_value(response)
    }

    /// Stop the background tasks. Pending calls resolve as closed.
    pub fn shutdown(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Unwrap a `Runtime.evaluate` response into its value, surfacing page
/// exceptions as errors.
pub(crate) fn evaluation_value(response: Value) -> Result<Value, AutomationError> {
    if let Some(details) = response.get("exceptionDetails") {
        let description = details
            .pointer("/exception/description")
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("JavaScript exception");
        return Err(AutomationError::PlatformError(format!(
            "JavaScript execution failed: {description}"
        )));
    }
    Ok(response
        .pointer("/result/value")
        .cloned()
        .unwrap_or(Value::Null))
}
