use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::{EndpointConnector, McpError, ToolCallResult, ToolEndpoint, ToolHandle};
use crate::config::ServerConnectionParams;

/// The tools one connected endpoint advertised.
#[derive(Clone)]
pub struct ToolSet {
    endpoint: Arc<dyn ToolEndpoint>,
    handles: Vec<ToolHandle>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("endpoint", &self.endpoint.label())
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolSet {
    pub fn new(endpoint: Arc<dyn ToolEndpoint>, handles: Vec<ToolHandle>) -> Self {
        Self { endpoint, handles }
    }

    pub fn endpoint_label(&self) -> &str {
        self.endpoint.label()
    }

    pub fn handles(&self) -> &[ToolHandle] {
        &self.handles
    }

    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Narrows the set to the named tools. Every name must have been discovered.
    pub fn select(&self, names: &[&str]) -> Result<ToolSet> {
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            let handle = self
                .get(name)
                .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;
            handles.push(handle.clone());
        }
        Ok(Self {
            endpoint: Arc::clone(&self.endpoint),
            handles,
        })
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        if !self.contains(name) {
            return Err(McpError::UnknownTool(name.to_string()).into());
        }
        self.endpoint.call_tool(name, arguments).await
    }
}

/// Owns one endpoint connection for the duration of a scoped block.
pub struct ToolAdapter {
    tools: ToolSet,
}

impl ToolAdapter {
    /// Connects and discovers tools. A discovery failure closes the endpoint
    /// before the error is returned.
    pub async fn connect(
        connector: &dyn EndpointConnector,
        label: &str,
        params: &ServerConnectionParams,
    ) -> Result<Self> {
        let endpoint = connector.connect(label, params).await?;
        Self::open(endpoint).await
    }

    pub async fn open(endpoint: Arc<dyn ToolEndpoint>) -> Result<Self> {
        match endpoint.list_tools().await {
            Ok(handles) => {
                log::info!(
                    "{} endpoint offers {} tools",
                    endpoint.label(),
                    handles.len()
                );
                Ok(Self {
                    tools: ToolSet::new(endpoint, handles),
                })
            }
            Err(e) => {
                if let Err(close_err) = endpoint.close().await {
                    log::warn!(
                        "Failed to close {} endpoint after discovery error: {}",
                        endpoint.label(),
                        close_err
                    );
                }
                Err(e)
            }
        }
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Runs `body` with the discovered tools, then closes the endpoint whether
    /// or not `body` succeeded. An error from `body` takes precedence over a
    /// close error.
    pub async fn scoped<F, Fut, T>(self, body: F) -> Result<T>
    where
        F: FnOnce(ToolSet) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let endpoint = Arc::clone(&self.tools.endpoint);
        let outcome = body(self.tools).await;
        let closed = endpoint.close().await;

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                log::warn!("Failed to close {} endpoint: {}", endpoint.label(), close_err);
                Err(e)
            }
        }
    }
}
