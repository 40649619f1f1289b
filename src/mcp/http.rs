use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;

use super::{
    initialize_params, into_result, notification, parse_tools_page, request, McpError,
    ToolCallResult, ToolEndpoint, ToolHandle, CALL_TIMEOUT, DISCOVERY_TIMEOUT,
};

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A remote tool endpoint using the streamable-HTTP transport.
///
/// Each JSON-RPC message is POSTed to the endpoint URL. Replies arrive either
/// as a JSON body or as a `text/event-stream` whose `data:` events carry the
/// JSON-RPC messages. The session id handed out on initialize is echoed on
/// every later request and used to terminate the session on close.
#[derive(Debug)]
pub struct StreamableHttpEndpoint {
    label: String,
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    closed: RwLock<bool>,
}

impl StreamableHttpEndpoint {
    pub async fn connect(label: &str, url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("internship-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let endpoint = Self {
            label: label.to_string(),
            url: url.to_string(),
            client,
            session_id: RwLock::new(None),
            closed: RwLock::new(false),
        };

        let result = endpoint
            .request("initialize", initialize_params(), DISCOVERY_TIMEOUT)
            .await?;

        let server = result
            .pointer("/serverInfo/name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown");
        log::debug!("{} endpoint initialized (server: {})", label, server);

        if let Err(e) = endpoint.notify("notifications/initialized").await {
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

    fn post(
        &self,
        body: &Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .json(body)
            .timeout(timeout);

        if let Some(sid) = session_id {
            builder = builder.header(SESSION_HEADER, sid);
        }

        builder
    }

    async fn ensure_open(&self) -> Result<Option<String>, McpError> {
        if *self.closed.read().await {
            return Err(McpError::Closed);
        }
        Ok(self.session_id.read().await.clone())
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let session_id = self.ensure_open().await?;
        let response = self
            .post(&notification(method), session_id.as_deref(), DISCOVERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let session_id = self.ensure_open().await?;
        let id = format!("{}_{}", method, uuid::Uuid::new_v4());

        let response = self
            .post(&request(&id, method, params), session_id.as_deref(), timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::Timeout(method.to_string())
                } else {
                    McpError::Transport(e.to_string())
                }
            })?;

        if let Some(sid) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|h| h.to_str().ok())
        {
            let mut current = self.session_id.write().await;
            if current.as_deref() != Some(sid) {
                log::debug!("{} endpoint session established", self.label);
                *current = Some(sid.to_string());
            }
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND && session_id.is_some() {
            return Err(McpError::Transport("session expired (404)".to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body: truncate(&body, 200),
            }
            .into());
        }

        let is_event_stream = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/event-stream"))
            .unwrap_or(false);

        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let message = if is_event_stream {
            find_event_response(&body, &id)?
        } else {
            serde_json::from_str(&body).map_err(|e| {
                McpError::Malformed(format!("{} (body: {})", e, truncate(&body, 200)))
            })?
        };

        Ok(into_result(message)?)
    }
}

/// Collects the JSON payloads of every `data:` event in an SSE body.
pub(crate) fn parse_sse_messages(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() {
                if let Ok(value) = serde_json::from_str::<Value>(&data) {
                    messages.push(value);
                }
                data.clear();
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    messages
}

fn find_event_response(body: &str, id: &str) -> Result<Value, McpError> {
    parse_sse_messages(body)
        .into_iter()
        .find(|m| m.get("id").and_then(|v| v.as_str()) == Some(id))
        .ok_or_else(|| {
            McpError::Malformed(format!("no response for request {} in event stream", id))
        })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl ToolEndpoint for StreamableHttpEndpoint {
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
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return Ok(());
            }
            *closed = true;
        }

        let Some(session_id) = self.session_id.write().await.take() else {
            log::info!("Disconnected from {} endpoint", self.label);
            return Ok(());
        };

        match self
            .client
            .delete(&self.url)
            .header(SESSION_HEADER, session_id)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                log::debug!("{} endpoint does not support session termination", self.label);
            }
            Ok(response) if !response.status().is_success() => {
                log::warn!(
                    "{} endpoint rejected session termination: {}",
                    self.label,
                    response.status()
                );
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Failed to terminate {} endpoint session: {}", self.label, e);
            }
        }

        log::info!("Disconnected from {} endpoint", self.label);
        Ok(())
    }
}
