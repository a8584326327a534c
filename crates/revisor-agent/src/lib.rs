//! # revisor-agent
//!
//! Text-generation backends used by the revision roles.
//!
//! Every role talks to a backend through the [`Agent`] trait: one
//! [`Prompt`] (role contract + structured context) in, one [`AgentOutput`]
//! out. CLI coding agents are driven through [`ProcessSpawner`]; the
//! [`OpenAiAgent`] speaks the chat-completions protocol over HTTP.

mod claude;
mod cursor;
mod openai;
mod opencode;
mod output;
mod spawner;
mod traits;

pub use claude::ClaudeCodeAgent;
pub use cursor::CursorAgent;
pub use openai::{OpenAiAgent, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use opencode::OpenCodeAgent;
pub use output::{AgentOutput, TokenUsage};
pub use spawner::ProcessSpawner;
pub use traits::{Agent, AgentConfig, AgentError, AgentType, Prompt};

/// Backend settings that are not per-call
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Base URL for the chat-completions backend
    pub base_url: String,
    /// Environment variable holding the chat-completions API key
    pub api_key_env: String,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

/// Create an agent by type
pub fn create_agent(agent_type: AgentType, options: &BackendOptions) -> Box<dyn Agent> {
    match agent_type {
        AgentType::ClaudeCode => Box::new(ClaudeCodeAgent::new()),
        AgentType::OpenCode => Box::new(OpenCodeAgent::new()),
        AgentType::Cursor => Box::new(CursorAgent::new()),
        AgentType::OpenAi => Box::new(OpenAiAgent::from_env(
            options.base_url.clone(),
            &options.api_key_env,
        )),
    }
}
