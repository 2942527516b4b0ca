//! Headless Chrome page session over the DevTools protocol.
//!
//! Only the handful of commands the watcher needs are implemented.

use crate::fetcher::js_string;
use crate::traits::PageSession;
use crate::types::PageError;
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingTx = oneshot::Sender<std::result::Result<Value, String>>;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(15);

const KNOWN_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Locate a Chrome or Chromium binary, preferring an explicit path.
pub fn find_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured browser {} does not exist, searching defaults", path.display());
    }

    KNOWN_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

struct CdpCommand {
    method: String,
    params: Value,
    response_tx: PendingTx,
}

pub struct CdpSession {
    cmd_tx: mpsc::Sender<CdpCommand>,
    chrome_process: Mutex<Option<Child>>,
    _handler: JoinHandle<()>,
}

impl CdpSession {
    pub async fn launch(chrome_path: &Path) -> std::result::Result<Self, PageError> {
        let port = free_port()?;

        let mut child = Command::new(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--remote-debugging-port={}", port))
            .arg("--window-size=1280,800")
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PageError::Launch {
                context: e.to_string(),
            })?;

        let ws_url = wait_for_ws_url(port, &mut child).await?;
        let session = Self::connect(&ws_url).await?;
        *session.chrome_process.lock().await = Some(child);

        info!("Launched headless browser {} on port {}", chrome_path.display(), port);
        Ok(session)
    }

    /// Attach to a page target of an already running browser. Closing such a
    /// session leaves the browser process alone.
    pub async fn connect(ws_url: &str) -> std::result::Result<Self, PageError> {
        debug!("Connecting to DevTools at {}", ws_url);

        let (ws, _) = connect_async(ws_url).await.map_err(|e| PageError::Launch {
            context: format!("WebSocket connect: {}", e),
        })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<CdpCommand>(16);
        let handler = tokio::spawn(cdp_handler_loop(ws, cmd_rx));

        Ok(Self {
            cmd_tx,
            chrome_process: Mutex::new(None),
            _handler: handler,
        })
    }

    async fn send_cdp(&self, method: &str, params: Value) -> std::result::Result<Value, PageError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(CdpCommand {
                method: method.to_string(),
                params,
                response_tx: tx,
            })
            .await
            .map_err(|_| PageError::Cdp("handler closed".to_string()))?;

        let result = tokio::time::timeout(COMMAND_TIMEOUT, rx)
            .await
            .map_err(|_| PageError::Timeout {
                timeout_ms: COMMAND_TIMEOUT.as_millis() as u64,
                context: format!("CDP {}", method),
            })?
            .map_err(|_| PageError::Cdp("response dropped".to_string()))?;

        result.map_err(PageError::Cdp)
    }

    async fn evaluate(&self, expression: &str) -> std::result::Result<Value, PageError> {
        let result = self
            .send_cdp(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let msg = exception["exception"]["description"]
                .as_str()
                .or_else(|| exception["text"].as_str())
                .unwrap_or("evaluation error");
            return Err(PageError::Evaluate(msg.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    async fn wait_until_loaded(&self, url: &str) -> std::result::Result<(), PageError> {
        let deadline = Instant::now() + COMMAND_TIMEOUT;
        loop {
            match self.evaluate("document.readyState").await {
                Ok(state) if state.as_str() == Some("complete") => return Ok(()),
                Ok(_) => {}
                // The execution context is torn down while the document is swapped
                Err(e @ (PageError::Evaluate(_) | PageError::Cdp(_))) if !self.cmd_tx.is_closed() => {
                    debug!("Page not ready yet: {}", e);
                }
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    reason: "page did not finish loading".to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[async_trait]
impl PageSession for CdpSession {
    async fn navigate(&self, url: &str) -> std::result::Result<(), PageError> {
        let result = self
            .send_cdp("Page.navigate", json!({ "url": url }))
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(PageError::Navigation {
                url: url.to_string(),
                reason: error_text.to_string(),
            });
        }

        self.wait_until_loaded(url).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> std::result::Result<(), PageError> {
        let js = format!(
            r"new Promise((resolve, reject) => {{
                if (document.querySelector({sel})) return resolve(true);
                const observer = new MutationObserver(() => {{
                    if (document.querySelector({sel})) {{
                        observer.disconnect();
                        resolve(true);
                    }}
                }});
                observer.observe(document.documentElement, {{ childList: true, subtree: true }});
                setTimeout(() => {{ observer.disconnect(); reject(new Error('Timeout')); }}, {t});
            }})",
            sel = js_string(selector),
            t = timeout_ms,
        );

        tokio::time::timeout(Duration::from_millis(timeout_ms.saturating_add(1000)), self.evaluate(&js))
            .await
            .map_err(|_| PageError::Timeout {
                timeout_ms,
                context: format!("waiting for {}", selector),
            })?
            .map_err(|e| PageError::Timeout {
                timeout_ms,
                context: format!("waiting for {}: {}", selector, e),
            })?;

        Ok(())
    }

    async fn click(&self, selector: &str) -> std::result::Result<(), PageError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(selector)
        );
        match self.evaluate(&js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(PageError::ElementNotFound {
                selector: selector.to_string(),
            }),
        }
    }

    async fn extract(&self, selector: &str, extractor: &str) -> std::result::Result<Value, PageError> {
        let js = format!(
            "(() => {{ const e = document.querySelector({sel}); if (!e) return {{ missing: true }}; return {{ value: ({f})(e) }}; }})()",
            sel = js_string(selector),
            f = extractor,
        );
        let result = self.evaluate(&js).await?;
        if result.get("missing").is_some() {
            return Err(PageError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn close(&self) -> std::result::Result<(), PageError> {
        if let Some(mut child) = self.chrome_process.lock().await.take() {
            child.kill().await.map_err(|e| PageError::Cdp(format!("kill browser: {}", e)))?;
            info!("Closed headless browser");
        }
        Ok(())
    }
}

fn free_port() -> std::result::Result<u16, PageError> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(|e| PageError::Launch {
        context: format!("bind port: {}", e),
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| PageError::Launch {
            context: format!("local_addr: {}", e),
        })?
        .port();
    Ok(port)
}

/// Poll the DevTools `/json` listing until the browser exposes a page target.
async fn wait_for_ws_url(port: u16, child: &mut Child) -> std::result::Result<String, PageError> {
    let url = format!("http://127.0.0.1:{}/json", port);
    let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
        current_interval: Duration::from_millis(100),
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_secs(1),
        multiplier: 1.5,
        max_elapsed_time: Some(LAUNCH_TIMEOUT),
        ..Default::default()
    };

    while let Some(delay) = backoff.next_backoff() {
        tokio::time::sleep(delay).await;

        if let Some(status) = child.try_wait().map_err(|e| PageError::Launch {
            context: format!("wait: {}", e),
        })? {
            return Err(PageError::Launch {
                context: format!("browser exited early with {}", status),
            });
        }

        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        let page = targets
            .iter()
            .find(|t| t["type"].as_str() == Some("page"))
            .and_then(|t| t["webSocketDebuggerUrl"].as_str());
        if let Some(ws_url) = page {
            return Ok(ws_url.to_string());
        }
    }

    Err(PageError::Launch {
        context: format!(
            "browser did not expose a page within {:?} on port {}",
            LAUNCH_TIMEOUT, port
        ),
    })
}

/// Forwards commands over the socket and routes responses back by id.
async fn cdp_handler_loop(ws: WsStream, mut cmd_rx: mpsc::Receiver<CdpCommand>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = next_id;
                next_id += 1;
                let msg = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                // Callers that timed out have dropped their receivers
                pending.retain(|_, tx| !tx.is_closed());
                pending.insert(id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(val) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                // Events carry no id and are ignored
                if let Some(id) = val.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.remove(&id) {
                        if let Some(err) = val.get("error") {
                            let msg = err["message"].as_str().unwrap_or("CDP error");
                            let _ = tx.send(Err(msg.to_string()));
                        } else {
                            let _ = tx.send(Ok(val["result"].clone()));
                        }
                    }
                }
            }
        }
    }

    debug!("DevTools connection closed");
}
