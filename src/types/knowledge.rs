use serde::{Deserialize, Serialize};

/// Static domain rules attached to an agent and rendered into its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeText {
    pub name: String,
    content: String,
}

impl KnowledgeText {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into().trim().to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
