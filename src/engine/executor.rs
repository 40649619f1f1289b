use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::providers::{LLMProvider, Message};
use crate::types::{AgentSpec, TaskOutput, TaskSpec, ToolInvocation};

/// Configuration for the agent executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum model turns per task
    pub max_iterations: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_iterations: 20 }
    }
}

/// A tool call parsed from a model turn
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub params: Value,
}

/// Runs one task for one agent: alternates model turns and tool calls until
/// the model answers without calling a tool.
pub struct AgentExecutor {
    llm_provider: Arc<dyn LLMProvider>,
    config: ExecutorConfig,
}

impl AgentExecutor {
    pub fn new(llm_provider: Arc<dyn LLMProvider>, config: ExecutorConfig) -> Self {
        Self {
            llm_provider,
            config,
        }
    }

    pub async fn execute(
        &self,
        agent: &AgentSpec,
        task: &TaskSpec,
        context: &[TaskOutput],
    ) -> Result<TaskOutput> {
        let started_at = Utc::now();
        let messages = vec![
            Message::system(agent.system_prompt()),
            Message::user(task.prompt(context)),
        ];

        let (raw, tool_invocations) = self.run_conversation(messages, agent).await?;

        Ok(TaskOutput {
            task_id: task.id,
            agent_role: agent.role.clone(),
            description: task.description.clone(),
            raw,
            tool_invocations,
            started_at,
            completed_at: Utc::now(),
        })
    }

    async fn run_conversation(
        &self,
        mut messages: Vec<Message>,
        agent: &AgentSpec,
    ) -> Result<(String, Vec<ToolInvocation>)> {
        let mut invocations = Vec::new();
        let mut iterations = 0;

        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                return Err(anyhow!(
                    "{} exceeded {} iterations without a final answer",
                    agent.role,
                    self.config.max_iterations
                ));
            }

            let response = self
                .llm_provider
                .complete(&agent.model, messages.clone())
                .await?;

            let tool_calls = parse_tool_calls(&response);
            if tool_calls.is_empty() {
                if response.contains("\"tool\"") {
                    log::warn!(
                        "{} mentioned a tool but no call could be parsed, \
                         treating the turn as the final answer",
                        agent.role
                    );
                }
                let answer = final_answer(&response);
                step_log(agent, &format!("{} final answer: {}", agent.role, answer));
                return Ok((answer, invocations));
            }

            let mut tool_outputs = Vec::new();
            for call in tool_calls {
                step_log(
                    agent,
                    &format!("{} using tool {} with {}", agent.role, call.tool, call.params),
                );

                let invocation = if agent.tools.contains(&call.tool) {
                    let result = agent.tools.call(&call.tool, call.params.clone()).await?;
                    ToolInvocation {
                        tool: call.tool.clone(),
                        arguments: call.params,
                        observation: result.observation(),
                        is_error: result.is_error,
                    }
                } else {
                    ToolInvocation {
                        tool: call.tool.clone(),
                        arguments: call.params,
                        observation: format!(
                            "Tool {} is not available. Available tools: {}",
                            call.tool,
                            agent.tools.names().join(", ")
                        ),
                        is_error: true,
                    }
                };

                if invocation.is_error {
                    log::warn!(
                        "Tool {} reported an error: {}",
                        invocation.tool,
                        invocation.observation
                    );
                }

                tool_outputs.push(format!(
                    "Tool {} {}: {}",
                    invocation.tool,
                    if invocation.is_error { "error" } else { "result" },
                    invocation.observation
                ));
                invocations.push(invocation);
            }

            messages.push(Message::assistant(response));
            messages.push(Message::user(format!(
                "Tool execution results:\n{}",
                tool_outputs.join("\n")
            )));
        }
    }
}

fn step_log(agent: &AgentSpec, line: &str) {
    if agent.verbose {
        log::info!("{}", line);
    } else {
        log::debug!("{}", line);
    }
}

/// Parses tool calls from a model turn.
/// Format: one `{"tool": "name", "params": {...}}` object per line. When no line
/// holds a call, fenced code blocks are parsed whole so pretty-printed calls
/// still count.
pub fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    let calls: Vec<ToolCall> = response
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{') && line.contains("\"tool\""))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|value| tool_call(&value))
        .collect();

    if !calls.is_empty() {
        return calls;
    }

    fenced_blocks(response)
        .into_iter()
        .filter_map(|block| serde_json::from_str::<Value>(block).ok())
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().filter_map(tool_call).collect::<Vec<_>>(),
            other => tool_call(&other).into_iter().collect(),
        })
        .collect()
}

fn tool_call(value: &Value) -> Option<ToolCall> {
    let tool = value.get("tool")?.as_str()?;
    let params = value
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    Some(ToolCall {
        tool: tool.to_string(),
        params,
    })
}

/// Bodies of the ``` fenced blocks in a turn, without their info strings.
fn fenced_blocks(response: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = response;

    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(newline) = after.find('\n') else {
            break;
        };
        let body = &after[newline + 1..];
        let Some(end) = body.find("```") else {
            break;
        };
        blocks.push(body[..end].trim());
        rest = &body[end + 3..];
    }

    blocks
}

/// Text after the last `Final Answer:` marker, or the whole turn.
pub fn final_answer(response: &str) -> String {
    match response.rfind("Final Answer:") {
        Some(idx) => response[idx + "Final Answer:".len()..].trim().to_string(),
        None => response.trim().to_string(),
    }
}
