use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::agent::collapse;
use super::{AgentId, AgentSpec, TaskId};

/// An instruction bound to exactly one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub description: String,
    pub expected_output: String,
    pub agent_id: AgentId,
    pub output_file: Option<PathBuf>,
}

impl TaskSpec {
    pub fn new(
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: &AgentSpec,
    ) -> Self {
        Self {
            id: TaskId::new_v4(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent_id: agent.id,
            output_file: None,
        }
    }

    pub fn with_output_file(mut self, path: impl AsRef<Path>) -> Self {
        self.output_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// First line of the description, for log lines.
    pub fn summary(&self) -> String {
        let line = self
            .description
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        let collapsed = collapse(line);
        match collapsed.char_indices().nth(80) {
            Some((idx, _)) => format!("{}…", &collapsed[..idx]),
            None => collapsed,
        }
    }

    /// User prompt for this task, including outputs of earlier tasks.
    pub fn prompt(&self, context: &[TaskOutput]) -> String {
        let mut parts = vec![
            format!("Current Task: {}", self.description.trim()),
            format!(
                "This is the expected criteria for your final answer: {}",
                self.expected_output.trim()
            ),
        ];

        if !context.is_empty() {
            let earlier: Vec<String> = context
                .iter()
                .map(|o| format!("[{}]\n{}", o.agent_role, o.raw.trim()))
                .collect();
            parts.push(format!(
                "This is the context you're working with:\n{}",
                earlier.join("\n\n")
            ));
        }

        parts.push(
            "Begin! This is VERY important to you, use the tools available and give your best \
             Final Answer."
                .to_string(),
        );
        parts.join("\n\n")
    }
}

/// One tool call the agent made while working on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: Value,
    pub observation: String,
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: TaskId,
    pub agent_role: String,
    pub description: String,
    pub raw: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(role: &str, raw: &str) -> TaskOutput {
        TaskOutput {
            task_id: TaskId::new_v4(),
            agent_role: role.to_string(),
            description: String::new(),
            raw: raw.to_string(),
            tool_invocations: vec![],
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    fn bare_task(description: &str) -> TaskSpec {
        TaskSpec {
            id: TaskId::new_v4(),
            description: description.to_string(),
            expected_output: "A list".to_string(),
            agent_id: AgentId::new_v4(),
            output_file: None,
        }
    }

    #[test]
    fn test_prompt_without_context() {
        let task = bare_task("Read the README");
        let prompt = task.prompt(&[]);
        assert!(prompt.starts_with("Current Task: Read the README"));
        assert!(prompt.contains("expected criteria for your final answer: A list"));
        assert!(!prompt.contains("context you're working with"));
    }

    #[test]
    fn test_prompt_includes_earlier_outputs() {
        let task = bare_task("Update the doc");
        let prompt = task.prompt(&[output("Expert Git User", "Acme: Quant Intern")]);
        assert!(prompt.contains("context you're working with"));
        assert!(prompt.contains("[Expert Git User]\nAcme: Quant Intern"));
    }

    #[test]
    fn test_summary_uses_first_line() {
        let task = bare_task("\n   MAIN OBJECTIVE: Update   the doc\n  more detail");
        assert_eq!(task.summary(), "MAIN OBJECTIVE: Update the doc");
    }

    #[test]
    fn test_output_file() {
        let task = bare_task("x").with_output_file("out/report.md");
        assert_eq!(task.output_file, Some(PathBuf::from("out/report.md")));
    }
}
