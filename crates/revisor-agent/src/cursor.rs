use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::{Agent, AgentConfig, AgentError, AgentOutput, AgentType, ProcessSpawner, Prompt};

/// Cursor agent CLI backend
pub struct CursorAgent {
    binary_path: PathBuf,
}

impl CursorAgent {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("cursor"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }
}

impl Default for CursorAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for CursorAgent {
    fn name(&self) -> &str {
        "Cursor"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::Cursor
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .args(["agent", "--help"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn execute(
        &self,
        prompt: &Prompt,
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        debug!(
            agent = self.name(),
            prompt_len = prompt.len(),
            "Executing agent"
        );

        // Usage: cursor agent -p "prompt" [--model "model"] --output-format text
        let text = prompt.flatten();
        let mut args = vec!["agent", "-p", text.as_str()];

        let model_arg;
        if let Some(ref model) = config.model {
            model_arg = model.clone();
            args.push("--model");
            args.push(&model_arg);
        }

        args.push("--output-format");
        args.push("text");

        ProcessSpawner::spawn(&self.binary_path, &args, config).await
    }
}
