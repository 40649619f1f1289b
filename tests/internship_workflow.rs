//! Workflow tests with fake tool endpoints and a scripted model.
//!
//! Covers:
//! - configuration flowing unchanged into connection params, agents and tasks
//! - nested endpoint lifetimes (GitHub outer, Google inner)
//! - fixed task order and summary file handling
//! - an end-to-end reconciliation run

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use internship_sync::config::{Config, ServerConnectionParams};
use internship_sync::internship::{self, SyncOptions, GITHUB_ENDPOINT, GOOGLE_ENDPOINT};
use internship_sync::mcp::{EndpointConnector, ToolCallResult, ToolEndpoint, ToolHandle};
use internship_sync::providers::ScriptedLLMProvider;

type EventLog = Arc<Mutex<Vec<String>>>;

struct FakeEndpoint {
    label: String,
    tools: Vec<&'static str>,
    replies: HashMap<&'static str, String>,
    calls: Mutex<Vec<(String, Value)>>,
    events: EventLog,
}

impl FakeEndpoint {
    fn calls_to(&self, tool: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }
}

#[async_trait]
impl ToolEndpoint for FakeEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_tools(&self) -> Result<Vec<ToolHandle>> {
        Ok(self.tools.iter().map(|n| ToolHandle::new(*n)).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        self.events.lock().unwrap().push(format!("call:{}", name));
        Ok(ToolCallResult::text(
            self.replies.get(name).cloned().unwrap_or_else(|| "ok".to_string()),
        ))
    }

    async fn close(&self) -> Result<()> {
        self.events.lock().unwrap().push(format!("close:{}", self.label));
        Ok(())
    }
}

struct FakeConnector {
    github: Arc<FakeEndpoint>,
    google: Arc<FakeEndpoint>,
    fail_google: bool,
    params: Mutex<Vec<(String, ServerConnectionParams)>>,
    events: EventLog,
}

#[async_trait]
impl EndpointConnector for FakeConnector {
    async fn connect(
        &self,
        label: &str,
        params: &ServerConnectionParams,
    ) -> Result<Arc<dyn ToolEndpoint>> {
        self.params
            .lock()
            .unwrap()
            .push((label.to_string(), params.clone()));

        if label == GOOGLE_ENDPOINT && self.fail_google {
            anyhow::bail!("failed to spawn node: No such file or directory");
        }

        self.events.lock().unwrap().push(format!("connect:{}", label));
        let endpoint: Arc<dyn ToolEndpoint> = match label {
            GITHUB_ENDPOINT => self.github.clone(),
            _ => self.google.clone(),
        };
        Ok(endpoint)
    }
}

const README: &str = "| Company | Role | Location | Application |\n\
                      | Jane Street | Quant Trader Intern | NYC | https://janestreet.com/apply/qt |\n\
                      | ↳ | Software Engineer Intern | NYC | https://janestreet.com/apply/swe |";

const DOCUMENT: &str = "Banks:\n  1. Goldman Sachs\nQuant Trading/Asset Managers/Hedge Funds:\n  2. Jane Street\nOther Firms:";

fn fixture(fail_google: bool) -> FakeConnector {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));

    let github = Arc::new(FakeEndpoint {
        label: GITHUB_ENDPOINT.to_string(),
        tools: vec!["get_file_contents", "search_repositories"],
        replies: HashMap::from([("get_file_contents", README.to_string())]),
        calls: Mutex::new(Vec::new()),
        events: events.clone(),
    });

    let google = Arc::new(FakeEndpoint {
        label: GOOGLE_ENDPOINT.to_string(),
        tools: vec!["readGoogleDoc", "insertText", "applyTextStyle", "searchGoogleDocs"],
        replies: HashMap::from([("readGoogleDoc", DOCUMENT.to_string())]),
        calls: Mutex::new(Vec::new()),
        events: events.clone(),
    });

    FakeConnector {
        github,
        google,
        fail_google,
        params: Mutex::new(Vec::new()),
        events,
    }
}

fn config(path: &str, url: &str, model: &str) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("PATH_TO_SERVER", path.to_string()),
        ("SMITHERY_URL", url.to_string()),
        ("OPENAI_MODEL_NAME", model.to_string()),
    ]);
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn options_in(dir: &TempDir) -> SyncOptions {
    SyncOptions {
        output_file: dir.path().join("changes_to_internship_doc.md"),
        ..SyncOptions::default()
    }
}

fn reconciliation_script() -> Vec<String> {
    vec![
        r#"{"tool": "get_file_contents", "params": {"owner": "vanshb03", "repo": "Summer2026-Internships", "path": "README.md"}}"#.to_string(),
        "Final Answer: Jane Street has two open roles:\n\
         - Quant Trader Intern: https://janestreet.com/apply/qt\n\
         - Software Engineer Intern: https://janestreet.com/apply/swe"
            .to_string(),
        r#"{"tool": "readGoogleDoc", "params": {"documentId": "summer-2026"}}"#.to_string(),
        [
            "Jane Street is listed without highlighting, so I will highlight it and add both roles.",
            r##"{"tool": "applyTextStyle", "params": {"documentId": "summer-2026", "textToFind": "Jane Street", "backgroundColor": "#FFFF00"}}"##,
            r#"{"tool": "insertText", "params": {"documentId": "summer-2026", "text": "\n    * Quant Trader Intern : https://janestreet.com/apply/qt", "index": 120}}"#,
            r#"{"tool": "insertText", "params": {"documentId": "summer-2026", "text": "\n    * Software Engineer Intern : https://janestreet.com/apply/swe", "index": 180}}"#,
        ]
        .join("\n"),
        "Final Answer: ## Changes\n\
         - Highlighted in yellow: Jane Street\n\
         - Roles added: Quant Trader Intern, Software Engineer Intern\n\
         - Links added: https://janestreet.com/apply/qt, https://janestreet.com/apply/swe\n\
         - Uncertainties: none"
            .to_string(),
    ]
}

#[tokio::test]
async fn test_end_to_end_reconciliation() {
    let dir = TempDir::new().unwrap();
    let options = options_in(&dir);
    let connector = fixture(false);
    let llm = Arc::new(ScriptedLLMProvider::new(reconciliation_script()));

    let cfg = config("/opt/gdocs/server.js", "https://server.smithery.ai/github/mcp", "gpt-4o");
    let output = internship::run(&cfg, &options, &connector, llm.clone())
        .await
        .unwrap();

    assert_eq!(connector.google.calls_to("applyTextStyle").len(), 1);
    assert_eq!(connector.google.calls_to("insertText").len(), 2);
    assert_eq!(connector.google.calls_to("readGoogleDoc").len(), 1);
    assert_eq!(connector.github.calls_to("get_file_contents").len(), 1);
    assert_eq!(
        connector.google.calls_to("applyTextStyle")[0]["textToFind"],
        json!("Jane Street")
    );

    let summary = std::fs::read_to_string(&options.output_file).unwrap();
    assert!(summary.contains("Quant Trader Intern"));
    assert!(summary.contains("Software Engineer Intern"));
    assert_eq!(summary, output.raw);
    assert_eq!(llm.remaining(), 0);

    // The README listing reaches the reconciliation task as context.
    let requests = llm.requests();
    let reconcile_prompt = &requests[2].1[1].content;
    assert!(reconcile_prompt.contains("Summer 2026 Internship List"));
    assert!(reconcile_prompt.contains("[Expert Git User]\nJane Street has two open roles"));

    // The README content came back to the model as an observation.
    assert!(requests[1].1[3].content.contains("Jane Street | Quant Trader Intern"));
}

#[tokio::test]
async fn test_config_values_reach_params_and_agents() {
    let cases = [
        (
            "/srv/google-docs-mcp/dist/server.js",
            "https://server.smithery.ai/@smithery-ai/github/mcp?api_key=k",
            "gpt-4o",
        ),
        ("relative/server.js", "http://127.0.0.1:9000/mcp", "openai/gpt-4.1-mini"),
    ];

    for (path, url, model) in cases {
        let dir = TempDir::new().unwrap();
        let connector = fixture(false);
        let llm = Arc::new(ScriptedLLMProvider::new(reconciliation_script()));
        let cfg = config(path, url, model);

        internship::run(&cfg, &options_in(&dir), &connector, llm.clone())
            .await
            .unwrap();

        let params = connector.params.lock().unwrap().clone();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0, GITHUB_ENDPOINT);
        assert_eq!(
            params[0].1,
            ServerConnectionParams::StreamableHttp { url: url.to_string() }
        );
        assert_eq!(params[1].0, GOOGLE_ENDPOINT);
        match &params[1].1 {
            ServerConnectionParams::Stdio { command, args, env } => {
                assert_eq!(command, "node");
                assert_eq!(args, &vec![path.to_string()]);
                assert_eq!(env.get("NODE_ENV").map(String::as_str), Some("production"));
            }
            other => panic!("expected stdio params, got {:?}", other),
        }

        assert!(llm.requests().iter().all(|(m, _)| m == model));
    }
}

#[tokio::test]
async fn test_tasks_run_github_then_google() {
    let dir = TempDir::new().unwrap();
    let connector = fixture(false);
    let llm = Arc::new(ScriptedLLMProvider::new(reconciliation_script()));
    let cfg = config("server.js", "https://example.com/mcp", "gpt-4o");

    let output = internship::run(&cfg, &options_in(&dir), &connector, llm.clone())
        .await
        .unwrap();

    let roles: Vec<&str> = output
        .tasks_output
        .iter()
        .map(|o| o.agent_role.as_str())
        .collect();
    assert_eq!(roles, vec!["Expert Git User", "Expert Google User"]);

    let requests = llm.requests();
    assert!(requests[0].1[0].content.starts_with("You are Expert Git User."));
    assert!(requests[0].1[1].content.contains(
        "Go to the Summer2026-Internships repository hosted by vanshb03 and read the README"
    ));
    assert!(requests[2].1[0].content.starts_with("You are Expert Google User."));
    assert!(requests[2].1[0].content.contains("YOU CAN ONLY USE YELLOW"));

    // Each agent only sees its own endpoint's tools.
    assert!(!requests[0].1[0].content.contains("readGoogleDoc"));
    assert!(!requests[2].1[0].content.contains("get_file_contents"));
}

#[tokio::test]
async fn test_endpoints_close_in_reverse_order_on_success() {
    let dir = TempDir::new().unwrap();
    let connector = fixture(false);
    let llm = Arc::new(ScriptedLLMProvider::new(reconciliation_script()));
    let cfg = config("server.js", "https://example.com/mcp", "gpt-4o");

    internship::run(&cfg, &options_in(&dir), &connector, llm)
        .await
        .unwrap();

    let events = connector.events.lock().unwrap().clone();
    assert_eq!(&events[..2], &["connect:github", "connect:google"]);
    assert_eq!(&events[events.len() - 2..], &["close:google", "close:github"]);
    assert_eq!(events.iter().filter(|e| e.starts_with("close:")).count(), 2);
}

#[tokio::test]
async fn test_failure_mid_run_releases_both_and_skips_summary() {
    let dir = TempDir::new().unwrap();
    let options = options_in(&dir);
    let connector = fixture(false);
    // The model stops answering after the first task.
    let llm = Arc::new(ScriptedLLMProvider::new(
        reconciliation_script().into_iter().take(2),
    ));
    let cfg = config("server.js", "https://example.com/mcp", "gpt-4o");

    let err = internship::run(&cfg, &options, &connector, llm)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no responses left"));

    let events = connector.events.lock().unwrap().clone();
    let closes: Vec<&String> = events.iter().filter(|e| e.starts_with("close:")).collect();
    assert_eq!(closes, vec!["close:google", "close:github"]);
    assert!(!options.output_file.exists());
    assert!(connector.google.calls_to("insertText").is_empty());
}

#[tokio::test]
async fn test_inner_connection_failure_releases_outer() {
    let dir = TempDir::new().unwrap();
    let options = options_in(&dir);
    let connector = fixture(true);
    let llm = Arc::new(ScriptedLLMProvider::new(reconciliation_script()));
    let cfg = config("server.js", "https://example.com/mcp", "gpt-4o");

    let err = internship::run(&cfg, &options, &connector, llm.clone())
        .await
        .unwrap_err();

    let events = connector.events.lock().unwrap().clone();
    assert_eq!(events, vec!["connect:github", "close:github"]);
    assert!(llm.requests().is_empty());
    assert!(!options.output_file.exists());

    let mut out = Vec::new();
    internship::report_failure(&err, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "Error connecting to or using one of the MCP servers: failed to spawn node: No such file or directory\n\
         Ensure the MCP servers are running and accessible.\n"
    );
}

#[test]
fn test_missing_variable_reported_by_outer_handler() {
    let err: anyhow::Error = Config::from_lookup(|key| match key {
        "PATH_TO_SERVER" => Some("server.js".to_string()),
        "OPENAI_MODEL_NAME" => Some("gpt-4o".to_string()),
        _ => None,
    })
    .unwrap_err()
    .into();

    let mut out = Vec::new();
    internship::report_failure(&err, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "Error connecting to or using one of the MCP servers: environment variable SMITHERY_URL is not set"
    );
    assert_eq!(lines[1], "Ensure the MCP servers are running and accessible.");
}

#[tokio::test]
async fn test_discover_lists_both_endpoints() {
    let connector = fixture(false);
    let cfg = config("server.js", "https://example.com/mcp", "gpt-4o");

    let (github, google) = internship::discover(&cfg, &connector).await.unwrap();
    assert_eq!(github, vec!["get_file_contents", "search_repositories"]);
    assert_eq!(google.len(), 4);

    let events = connector.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["connect:github", "connect:google", "close:google", "close:github"]
    );
}
