use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::Config;

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// The delegated reasoning capability: given a conversation, produce the next
/// assistant turn.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or(crate::config::ConfigError::Missing(crate::config::OPENAI_API_KEY))?;

        let provider = Self::new(api_key);
        Ok(match &config.openai_api_base {
            Some(base) => provider.with_base_url(base.clone()),
            None => provider,
        })
    }
}

/// Model ids may carry a `openai/` routing prefix; the API wants the bare id.
fn api_model_name(model: &str) -> &str {
    model.strip_prefix("openai/").unwrap_or(model)
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String> {
        let api_messages: Vec<OpenAIMessage> = messages
            .into_iter()
            .map(|m| OpenAIMessage {
                role: m.role,
                content: Some(m.content),
            })
            .collect();

        let request = OpenAIRequest {
            model: api_model_name(model).to_string(),
            messages: api_messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("OpenAI API error {}: {}", status, body);
        }

        let result: OpenAIResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices in response"))
    }
}

/// Deterministic provider that replays canned turns in order and records
/// every conversation it was shown.
#[derive(Debug, Default)]
pub struct ScriptedLLMProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(String, Vec<Message>)>>,
}

impl ScriptedLLMProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(String, Vec<Message>)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LLMProvider for ScriptedLLMProvider {
    async fn complete(&self, model: &str, messages: Vec<Message>) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((model.to_string(), messages));
        }

        self.responses
            .lock()
            .map_err(|_| anyhow::anyhow!("scripted provider poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted provider has no responses left"))
    }
}
