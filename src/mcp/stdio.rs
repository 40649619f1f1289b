use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};

use super::{
    initialize_params, into_result, notification, parse_tools_page, request, McpError,
    ToolCallResult, ToolEndpoint, ToolHandle, CALL_TIMEOUT, DISCOVERY_TIMEOUT,
};

/// Variables a spawned server inherits from this process; everything else comes
/// from the configured environment.
const INHERITED_ENV: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

/// A tool endpoint running as a child process, speaking line-delimited JSON-RPC.
pub struct StdioEndpoint {
    label: String,
    command: String,
    pending: PendingMap,
    /// Set by the reader once the server's stdout is gone.
    disconnected: Arc<AtomicBool>,
    tx: Mutex<Option<mpsc::Sender<String>>>,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for StdioEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioEndpoint")
            .field("label", &self.label)
            .field("command", &self.command)
            .finish()
    }
}

impl StdioEndpoint {
    /// Spawns the server and completes the initialize handshake.
    pub async fn spawn(
        label: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(env);

        let mut child = cmd.spawn().map_err(|source| McpError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Transport("child stderr unavailable".to_string()))?;

        let (tx, rx) = mpsc::channel::<String>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let disconnected = Arc::new(AtomicBool::new(false));

        spawn_reader(
            label.to_string(),
            BufReader::new(stdout),
            Arc::clone(&pending),
            Arc::clone(&disconnected),
            tx.downgrade(),
        );
        spawn_stderr_pump(label.to_string(), BufReader::new(stderr));
        spawn_writer(label.to_string(), stdin, rx);

        let endpoint = Self {
            label: label.to_string(),
            command: command.to_string(),
            pending,
            disconnected,
            tx: Mutex::new(Some(tx)),
            child: Mutex::new(Some(child)),
        };

        if let Err(e) = endpoint.initialize().await {
            if let Err(close_err) = endpoint.close().await {
                log::warn!(
                    "Failed to close {} endpoint after handshake error: {}",
                    label,
                    close_err
                );
            }
            return Err(e);
        }

        Ok(endpoint)
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .request("initialize", initialize_params(), DISCOVERY_TIMEOUT)
            .await?;

        let server = result
            .pointer("/serverInfo/name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown");
        log::debug!("{} endpoint initialized (server: {})", self.label, server);

        self.send(notification("notifications/initialized")).await
    }

    async fn send(&self, message: Value) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(McpError::Closed.into());
        }
        let tx = self.tx.lock().await.clone().ok_or(McpError::Closed)?;
        tx.send(serde_json::to_string(&message)?)
            .await
            .map_err(|_| McpError::Closed)?;
        Ok(())
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let id = uuid::Uuid::new_v4().to_string();
        let (resp_tx, resp_rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), resp_tx);

        // The reader raises the flag before draining `pending`, so a request
        // registered after the drain sees it here.
        if self.disconnected.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(McpError::Closed.into());
        }

        if let Err(e) = self.send(request(&id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, resp_rx).await {
            Ok(Ok(response)) => Ok(into_result(response)?),
            Ok(Err(_)) => Err(McpError::Closed.into()),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout(method.to_string()).into())
            }
        }
    }
}

fn spawn_reader<R>(
    label: String,
    mut stdout: BufReader<R>,
    pending: PendingMap,
    disconnected: Arc<AtomicBool>,
    replies: mpsc::WeakSender<String>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match stdout.read_line(&mut line).await {
                Ok(0) => {
                    log::debug!("{} endpoint stdout closed", label);
                    break;
                }
                Ok(_) => {
                    let Ok(message) = serde_json::from_str::<Value>(&line) else {
                        log::debug!("{} endpoint wrote non-JSON line: {}", label, line.trim());
                        continue;
                    };
                    // Server-initiated requests and notifications carry a method.
                    if let Some(method) = message.get("method").and_then(|m| m.as_str()) {
                        match server_request_reply(method, &message) {
                            Some(reply) => {
                                let sent = match replies.upgrade() {
                                    Some(tx) => tx.send(reply.to_string()).await.is_ok(),
                                    None => false,
                                };
                                if !sent {
                                    log::debug!("{} endpoint reply to {} dropped", label, method);
                                }
                            }
                            None => log::debug!("{} endpoint notification: {}", label, method),
                        }
                        continue;
                    }
                    let id = match message.get("id") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Number(n)) => n.to_string(),
                        _ => continue,
                    };
                    if let Some(sender) = pending.lock().await.remove(&id) {
                        let _ = sender.send(message);
                    }
                }
                Err(e) => {
                    log::error!("Error reading {} endpoint stdout: {}", label, e);
                    break;
                }
            }
        }
        disconnected.store(true, Ordering::SeqCst);
        // Wake any callers still waiting so they observe the closed connection.
        pending.lock().await.clear();
    });
}

/// Reply to a request the server sent us. `ping` gets an empty result, any
/// other method a method-not-found error. Notifications get no reply.
fn server_request_reply(method: &str, message: &Value) -> Option<Value> {
    let id = message.get("id")?;
    let reply = if method == "ping" {
        json!({ "jsonrpc": "2.0", "id": id, "result": {} })
    } else {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("method not found: {}", method) }
        })
    };
    Some(reply)
}

fn spawn_stderr_pump<R>(label: String, mut stderr: BufReader<R>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match stderr.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => log::debug!("[{} server] {}", label, line.trim_end()),
            }
        }
    });
}

fn spawn_writer<W>(label: String, mut stdin: W, mut rx: mpsc::Receiver<String>)
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let written = async {
                stdin.write_all(msg.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                log::error!("Failed to write to {} endpoint stdin: {}", label, e);
                break;
            }
        }
        // Dropping stdin signals EOF to the server.
    });
}

#[async_trait]
impl ToolEndpoint for StdioEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_tools(&self) -> Result<Vec<ToolHandle>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.request("tools/list", params, DISCOVERY_TIMEOUT).await?;
            let (page, next) = parse_tools_page(&result)?;
            tools.extend(page);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result = self
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
                CALL_TIMEOUT,
            )
            .await?;
        Ok(ToolCallResult::from_result(&result))
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().await.take();

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                log::debug!("{} endpoint exited: {:?}", self.label, status?);
            }
            Err(_) => {
                log::debug!("{} endpoint did not exit after stdin closed, killing", self.label);
                child.kill().await?;
            }
        }

        log::info!("Disconnected from {} endpoint", self.label);
        Ok(())
    }
}
