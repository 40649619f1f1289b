use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::executor::{AgentExecutor, ExecutorConfig};
use crate::providers::LLMProvider;
use crate::types::{AgentId, AgentSpec, Process, TaskId, TaskOutput, TaskSpec, TaskStatus};

/// Result of a crew run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewOutput {
    /// Raw output of the last task
    pub raw: String,
    pub tasks_output: Vec<TaskOutput>,
}

/// Runs tasks against their agents in a fixed order.
pub struct Crew {
    agents: HashMap<AgentId, AgentSpec>,
    tasks: Vec<TaskSpec>,
    process: Process,
    verbose: bool,
    executor_config: ExecutorConfig,
}

impl Crew {
    pub fn new(agents: Vec<AgentSpec>, tasks: Vec<TaskSpec>, process: Process) -> Result<Self> {
        if tasks.is_empty() {
            bail!("a crew needs at least one task");
        }

        let mut by_id = HashMap::with_capacity(agents.len());
        for agent in agents {
            if agent.allow_delegation {
                bail!("agent '{}' allows delegation, which is not supported", agent.role);
            }
            by_id.insert(agent.id, agent);
        }

        for task in &tasks {
            if !by_id.contains_key(&task.agent_id) {
                bail!("task '{}' is bound to an agent outside the crew", task.summary());
            }
        }

        Ok(Self {
            agents: by_id,
            tasks,
            process,
            verbose: false,
            executor_config: ExecutorConfig::default(),
        })
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn status(&self, outputs: &[TaskOutput], task_id: TaskId) -> TaskStatus {
        if outputs.iter().any(|o| o.task_id == task_id) {
            TaskStatus::Done
        } else {
            TaskStatus::Pending
        }
    }

    pub async fn kickoff(&self, llm_provider: Arc<dyn LLMProvider>) -> Result<CrewOutput> {
        match self.process {
            Process::Sequential => self.run_sequential(llm_provider).await,
        }
    }

    async fn run_sequential(&self, llm_provider: Arc<dyn LLMProvider>) -> Result<CrewOutput> {
        let executor = AgentExecutor::new(llm_provider, self.executor_config.clone());
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.iter().enumerate() {
            let agent = self
                .agents
                .get(&task.agent_id)
                .ok_or_else(|| anyhow!("agent for task '{}' not found", task.summary()))?;

            self.log(&format!(
                "Task {}/{} [{}] started by {}: {}",
                index + 1,
                self.tasks.len(),
                self.status(&outputs, task.id).as_str(),
                agent.role,
                task.summary()
            ));

            let output = executor.execute(agent, task, &outputs).await?;

            if let Some(path) = &task.output_file {
                write_output_file(path, &output.raw).await?;
                log::info!("Wrote task output to {}", path.display());
            }

            outputs.push(output);
            self.log(&format!(
                "Task {}/{} [{}] with {} tool calls",
                index + 1,
                self.tasks.len(),
                self.status(&outputs, task.id).as_str(),
                outputs.last().map(|o| o.tool_invocations.len()).unwrap_or(0)
            ));
        }

        let raw = outputs.last().map(|o| o.raw.clone()).unwrap_or_default();
        Ok(CrewOutput {
            raw,
            tasks_output: outputs,
        })
    }

    fn log(&self, line: &str) {
        if self.verbose {
            log::info!("{}", line);
        } else {
            log::debug!("{}", line);
        }
    }
}

async fn write_output_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
