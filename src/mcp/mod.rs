//! Client side of the Model Context Protocol.
//!
//! Two transports are supported: a local process over stdio and a remote
//! streamable-HTTP endpoint. Both are wrapped by [`adapter::ToolAdapter`],
//! which owns the connection lifecycle.

pub mod adapter;
pub mod http;
pub mod stdio;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ServerConnectionParams;

pub use adapter::{ToolAdapter, ToolSet};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const CLIENT_NAME: &str = "internship-sync";

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("endpoint error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("request '{0}' timed out")]
    Timeout(String),
    #[error("connection closed")]
    Closed,
    #[error("tool '{0}' is not offered by this endpoint")]
    UnknownTool(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A named capability advertised by a connected endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHandle {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object" })
}

impl ToolHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: empty_schema(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub content: Vec<String>,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![content.into()],
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: vec![content.into()],
            is_error: true,
        }
    }

    /// Joined text used as the observation handed back to the model.
    pub fn observation(&self) -> String {
        self.content.join("\n")
    }

    /// Parses a `tools/call` result object.
    pub fn from_result(result: &Value) -> Self {
        let content = result
            .get("content")
            .and_then(|c| c.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item.get("type").and_then(|t| t.as_str()) {
                        Some("text") => item
                            .get("text")
                            .and_then(|t| t.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        Some("resource") => item
                            .pointer("/resource/text")
                            .and_then(|t| t.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| item.to_string()),
                        _ => item.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let is_error = result
            .get("isError")
            .and_then(|e| e.as_bool())
            .unwrap_or(false);

        Self { content, is_error }
    }
}

/// A connected tool endpoint.
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    fn label(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ToolHandle>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult>;

    /// Releases the connection. Called once by the owning adapter.
    async fn close(&self) -> Result<()>;
}

/// Opens endpoints from connection parameters.
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    async fn connect(
        &self,
        label: &str,
        params: &ServerConnectionParams,
    ) -> Result<Arc<dyn ToolEndpoint>>;
}

/// Connector for real MCP servers.
#[derive(Debug, Clone, Default)]
pub struct McpConnector;

#[async_trait]
impl EndpointConnector for McpConnector {
    async fn connect(
        &self,
        label: &str,
        params: &ServerConnectionParams,
    ) -> Result<Arc<dyn ToolEndpoint>> {
        log::info!("Connecting to {} endpoint ({})", label, params.describe());

        let endpoint: Arc<dyn ToolEndpoint> = match params {
            ServerConnectionParams::Stdio { command, args, env } => {
                Arc::new(stdio::StdioEndpoint::spawn(label, command, args, env).await?)
            }
            ServerConnectionParams::StreamableHttp { url } => {
                Arc::new(http::StreamableHttpEndpoint::connect(label, url).await?)
            }
        };

        Ok(endpoint)
    }
}

pub(crate) fn request(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

pub(crate) fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method
    })
}

pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

/// Extracts `result` from a JSON-RPC response, mapping `error` to [`McpError::Rpc`].
pub(crate) fn into_result(response: Value) -> Result<Value, McpError> {
    if let Some(error) = response.get("error") {
        return Err(McpError::Rpc {
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
        });
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| McpError::Malformed("response has neither result nor error".to_string()))
}

/// Parses one page of a `tools/list` result.
pub(crate) fn parse_tools_page(
    result: &Value,
) -> Result<(Vec<ToolHandle>, Option<String>), McpError> {
    let tools = result
        .get("tools")
        .cloned()
        .ok_or_else(|| McpError::Malformed("tools/list result missing tools".to_string()))?;
    let tools: Vec<ToolHandle> =
        serde_json::from_value(tools).map_err(|e| McpError::Malformed(e.to_string()))?;
    let cursor = result
        .get("nextCursor")
        .and_then(|c| c.as_str())
        .map(str::to_string);

    Ok((tools, cursor))
}
