use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::AgentOutput;

/// Errors that can occur while asking a backend for a completion
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Agent execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent not found at path: {0}")]
    NotFound(String),

    #[error("Agent configuration error: {0}")]
    ConfigError(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration for a single generation call
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Working directory for CLI backends
    pub working_dir: PathBuf,
    /// Per-call timeout (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
    /// Model to use (if the backend supports it)
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            timeout: None,
            env_vars: HashMap::new(),
            model: None,
        }
    }
}

impl AgentConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Supported generation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    ClaudeCode,
    OpenCode,
    Cursor,
    OpenAi,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::ClaudeCode => write!(f, "claude-code"),
            AgentType::OpenCode => write!(f, "opencode"),
            AgentType::Cursor => write!(f, "cursor"),
            AgentType::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(AgentType::ClaudeCode),
            "opencode" | "open-code" => Ok(AgentType::OpenCode),
            "cursor" => Ok(AgentType::Cursor),
            "openai" | "open-ai" | "chat-completions" => Ok(AgentType::OpenAi),
            _ => Err(format!("Unknown agent type: {}", s)),
        }
    }
}

/// A role's request to the generation backend: the role contract plus the
/// structured context it is allowed to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Single-text rendering for backends that only accept one prompt
    pub fn flatten(&self) -> String {
        format!(
            "## Instructions\n{}\n\n## Input\n{}",
            self.system.trim(),
            self.user.trim()
        )
    }

    /// Size in bytes of both parts
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }
}

/// The core abstraction over text-generation backends
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable name of the backend (e.g., "Claude Code", "OpenAI")
    fn name(&self) -> &str;

    /// The backend type
    fn agent_type(&self) -> AgentType;

    /// Run one generation call
    async fn execute(&self, prompt: &Prompt, config: &AgentConfig)
        -> Result<AgentOutput, AgentError>;

    /// Check if the backend can be reached from this machine
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_aliases() {
        assert_eq!("claude".parse::<AgentType>().unwrap(), AgentType::ClaudeCode);
        assert_eq!("Open-Code".parse::<AgentType>().unwrap(), AgentType::OpenCode);
        assert_eq!("openai".parse::<AgentType>().unwrap(), AgentType::OpenAi);
        assert!("gemini".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_prompt_flatten_keeps_both_parts() {
        let prompt = Prompt::new("  Be strict.\n", "{\"question\": \"q\"}");
        let flat = prompt.flatten();
        assert!(flat.starts_with("## Instructions\nBe strict."));
        assert!(flat.ends_with("## Input\n{\"question\": \"q\"}"));
    }

    #[test]
    fn test_config_builder() {
        let config = AgentConfig::new(PathBuf::from("/tmp"))
            .with_timeout(Duration::from_secs(5))
            .with_model("gpt-4o".into());
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
    }
}
