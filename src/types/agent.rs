use super::{AgentId, KnowledgeText};
use crate::mcp::ToolSet;

/// A named role bundle with the tools and model it works with.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub id: AgentId,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: ToolSet,
    pub model: String,
    pub knowledge: Vec<KnowledgeText>,
    pub verbose: bool,
    pub allow_delegation: bool,
}

impl AgentSpec {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        tools: ToolSet,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: AgentId::new_v4(),
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools,
            model: model.into(),
            knowledge: Vec::new(),
            verbose: false,
            allow_delegation: false,
        }
    }

    pub fn with_knowledge(mut self, knowledge: KnowledgeText) -> Self {
        self.knowledge.push(knowledge);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn allow_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    /// System prompt: who the agent is, what it knows, and which tools it may call.
    pub fn system_prompt(&self) -> String {
        let mut parts = vec![
            format!("You are {}. {}", self.role, collapse(&self.backstory)),
            format!("Your personal goal is: {}", collapse(&self.goal)),
        ];

        for knowledge in &self.knowledge {
            parts.push(format!(
                "Reference knowledge ({}):\n{}",
                knowledge.name,
                knowledge.content()
            ));
        }

        if self.tools.is_empty() {
            parts.push(
                "You have no tools available. Answer from the information given.".to_string(),
            );
        } else {
            let mut catalogue = vec!["You can use the following tools:".to_string()];
            for handle in self.tools.handles() {
                catalogue.push(format!(
                    "- {}: {}\n  parameters: {}",
                    handle.name,
                    handle.description.as_deref().unwrap_or("(no description)"),
                    handle.input_schema
                ));
            }
            parts.push(catalogue.join("\n"));
            parts.push(
                "To call a tool, write one line per call containing only a JSON object of the form \
                 {\"tool\": \"<tool name>\", \"params\": {...}}. You will receive the results and may \
                 call more tools. When you are finished, reply without any tool calls, starting \
                 with \"Final Answer:\" followed by your complete answer."
                    .to_string(),
            );
        }

        parts.join("\n\n")
    }
}

/// Collapses the indentation of multi-line prompt literals into single spaces.
pub(crate) fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
