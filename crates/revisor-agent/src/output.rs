use std::ops::AddAssign;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tokens billed for generation calls, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Output captured from one generation call
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// The generated text (stdout for CLI backends, message content for HTTP)
    pub text: String,
    /// Diagnostic output (stderr, finish reason)
    pub diagnostics: String,
    /// Exit code from the process; HTTP backends report 0
    pub exit_code: i32,
    /// Duration of the call
    pub duration: Duration,
    /// Token usage, for backends that report it
    pub usage: Option<TokenUsage>,
}

impl AgentOutput {
    pub fn new(text: String, diagnostics: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            text,
            diagnostics,
            exit_code,
            duration,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Check if the backend finished successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Count lines in the generated text
    pub fn text_lines(&self) -> usize {
        self.text.lines().count()
    }
}
