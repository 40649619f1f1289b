use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub const PATH_TO_SERVER: &str = "PATH_TO_SERVER";
pub const SMITHERY_URL: &str = "SMITHERY_URL";
pub const OPENAI_MODEL_NAME: &str = "OPENAI_MODEL_NAME";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Connection parameters for one tool endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ServerConnectionParams {
    /// Local process speaking line-delimited JSON-RPC over stdio
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Remote streamable-HTTP endpoint
    StreamableHttp { url: String },
}

impl ServerConnectionParams {
    pub fn describe(&self) -> String {
        match self {
            ServerConnectionParams::Stdio { command, args, .. } => {
                format!("stdio: {} {}", command, args.join(" "))
            }
            ServerConnectionParams::StreamableHttp { url } => {
                format!("streamable-http: {}", redact_query(url))
            }
        }
    }
}

// Hosted endpoints carry API keys in the query string.
fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?…", base),
        None => url.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub path_to_server: PathBuf,
    pub smithery_url: String,
    pub model_name: String,
    pub node_command: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
}

impl Config {
    /// Reads the process environment. Call `dotenv` beforehand to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let path_to_server = PathBuf::from(required(PATH_TO_SERVER)?);
        let smithery_url = required(SMITHERY_URL)?;
        let model_name = required(OPENAI_MODEL_NAME)?;

        let parsed = reqwest::Url::parse(&smithery_url).map_err(|e| ConfigError::Invalid {
            name: SMITHERY_URL,
            reason: e.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Invalid {
                name: SMITHERY_URL,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            path_to_server,
            smithery_url,
            model_name,
            node_command: "node".to_string(),
            openai_api_key: optional(OPENAI_API_KEY),
            openai_api_base: optional(OPENAI_API_BASE),
        })
    }

    /// Local Google Docs endpoint, run under node in production mode.
    pub fn google_server_params(&self) -> ServerConnectionParams {
        let mut env = HashMap::new();
        env.insert("NODE_ENV".to_string(), "production".to_string());

        ServerConnectionParams::Stdio {
            command: self.node_command.clone(),
            args: vec![self.path_to_server.to_string_lossy().to_string()],
            env,
        }
    }

    /// Remote GitHub endpoint.
    pub fn github_server_params(&self) -> ServerConnectionParams {
        ServerConnectionParams::StreamableHttp {
            url: self.smithery_url.clone(),
        }
    }
}
