use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::{Agent, AgentConfig, AgentError, AgentOutput, AgentType, Prompt, TokenUsage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI-compatible chat-completions backend
pub struct OpenAiAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiAgent {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("revisor/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Build from the environment variable holding the API key
    pub fn from_env(base_url: impl Into<String>, api_key_env: &str) -> Self {
        Self::new(base_url, std::env::var(api_key_env).ok())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Default for OpenAiAgent {
    fn default() -> Self {
        Self::from_env(DEFAULT_BASE_URL, "OPENAI_API_KEY")
    }
}

#[async_trait]
impl Agent for OpenAiAgent {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::OpenAi
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn execute(
        &self,
        prompt: &Prompt,
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::ConfigError("API key is not set".into()))?;
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

        debug!(
            agent = self.name(),
            model,
            prompt_len = prompt.len(),
            "Executing agent"
        );

        let body = ChatRequest {
            model,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let start = Instant::now();
        let mut request = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body);
        if let Some(limit) = config.timeout {
            request = request.timeout(limit);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AgentError::Timeout(config.timeout.unwrap_or_default())
            } else {
                AgentError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::ExecutionFailed(format!(
                "{} returned {}: {}",
                self.endpoint(),
                status,
                detail.chars().take(500).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let usage = parsed.usage.map(TokenUsage::from);
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ExecutionFailed("response had no choices".into()))?;

        let duration = start.elapsed();
        debug!(
            duration_ms = duration.as_millis(),
            total_tokens = usage.map(|u| u.total()),
            "Chat completion received"
        );

        let output = AgentOutput::new(
            choice.message.content.unwrap_or_default(),
            choice.finish_reason.unwrap_or_default(),
            0,
            duration,
        );
        Ok(match usage {
            Some(usage) => output.with_usage(usage),
            None => output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let agent = OpenAiAgent::new("http://localhost:8080/v1/", None);
        assert_eq!(agent.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let agent = OpenAiAgent::new(DEFAULT_BASE_URL, None);
        assert!(!agent.is_available().await);
        let result = agent
            .execute(&Prompt::new("s", "u"), &AgentConfig::default())
            .await;
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o",
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "contract",
                },
                ChatMessage {
                    role: "user",
                    content: "context",
                },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "context");
    }

    #[test]
    fn test_response_usage_parsed() {
        let body = r#"{
            "choices": [{"message": {"content": "<output>{}</output>"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 812, "completion_tokens": 64, "total_tokens": 876}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage.map(TokenUsage::from), Some(TokenUsage::new(812, 64)));

        let without: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "x"}}]}"#).unwrap();
        assert!(without.usage.is_none());
    }
}
