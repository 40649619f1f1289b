pub mod llm;

pub use llm::{LLMProvider, Message, OpenAIProvider, ScriptedLLMProvider};
