use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use revisor_agent::{Agent, AgentConfig, TokenUsage};
use tracing::{debug, info, warn};

use crate::output::{parse_output, OutputError};
use crate::{RoleInput, RoleKind, RolePrompts};

/// How often a role call is retried before the request is aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after a reply that did not match the role's output contract
    pub malformed_retries: u32,
    /// Retries after the backend failed or timed out
    pub generation_retries: u32,
    /// Base delay before a generation retry; doubles on each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            malformed_retries: 2,
            generation_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the generation retry following `failures` failures
    pub fn backoff_for(&self, failures: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1).min(6)))
    }
}

/// Why a role call is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Malformed,
    Unavailable,
}

/// Passed to the retry callback before each retry
#[derive(Debug, Clone)]
pub struct RetryNotice {
    pub role: RoleKind,
    pub attempt: u32,
    pub kind: FailureKind,
    pub reason: String,
}

/// Callback invoked before a role call is retried
pub type RetryCallback = Arc<dyn Fn(&RetryNotice) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    #[error("{role} produced malformed output after {attempts} attempt(s): {source}")]
    MalformedOutput {
        role: RoleKind,
        attempts: u32,
        #[source]
        source: OutputError,
    },

    #[error("Generation unavailable for {role} after {attempts} attempt(s): {reason}")]
    GenerationUnavailable {
        role: RoleKind,
        attempts: u32,
        reason: String,
    },

    #[error("Failed to build {role} prompt: {source}")]
    Prompt {
        role: RoleKind,
        #[source]
        source: serde_json::Error,
    },
}

impl RoleError {
    pub fn role(&self) -> RoleKind {
        match self {
            RoleError::MalformedOutput { role, .. }
            | RoleError::GenerationUnavailable { role, .. }
            | RoleError::Prompt { role, .. } => *role,
        }
    }
}

/// Runs one role call against the generation backend and enforces the
/// role's typed output contract. Token usage reported by the backend is
/// summed over every call made through the invoker, retries included.
pub struct RoleInvoker<'a> {
    agent: &'a dyn Agent,
    config: AgentConfig,
    role_models: HashMap<RoleKind, String>,
    retry: RetryPolicy,
    on_retry: Option<RetryCallback>,
    usage: Mutex<Option<TokenUsage>>,
}

impl<'a> RoleInvoker<'a> {
    pub fn new(agent: &'a dyn Agent, config: AgentConfig) -> Self {
        Self {
            agent,
            config,
            role_models: HashMap::new(),
            retry: RetryPolicy::default(),
            on_retry: None,
            usage: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use a different model for one role
    pub fn with_role_models(mut self, role_models: HashMap<RoleKind, String>) -> Self {
        self.role_models = role_models;
        self
    }

    pub fn with_retry_callback(mut self, on_retry: RetryCallback) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    fn config_for(&self, role: RoleKind) -> AgentConfig {
        match self.role_models.get(&role) {
            Some(model) => self.config.clone().with_model(model.clone()),
            None => self.config.clone(),
        }
    }

    /// Tokens used so far; `None` until the backend reports any usage
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage.lock().ok().and_then(|usage| *usage)
    }

    fn record_usage(&self, reported: Option<TokenUsage>) {
        let Some(reported) = reported else {
            return;
        };
        if let Ok(mut usage) = self.usage.lock() {
            *usage.get_or_insert_with(TokenUsage::default) += reported;
        }
    }

    fn notify(&self, notice: RetryNotice) {
        warn!(
            role = %notice.role,
            attempt = notice.attempt,
            kind = ?notice.kind,
            reason = %notice.reason,
            "Retrying role call"
        );
        if let Some(ref on_retry) = self.on_retry {
            on_retry(&notice);
        }
    }

    /// Call the backend for `input`'s role until it returns a valid reply or
    /// the retry budget is spent
    pub async fn invoke<I: RoleInput>(&self, input: &I) -> Result<I::Output, RoleError> {
        let role = I::KIND;
        let prompt = RolePrompts::build(input).map_err(|source| RoleError::Prompt { role, source })?;
        let config = self.config_for(role);

        debug!(
            %role,
            prompt_len = prompt.len(),
            model = config.model.as_deref().unwrap_or("default"),
            "Invoking role"
        );

        let mut malformed = 0u32;
        let mut unavailable = 0u32;

        loop {
            let attempt = malformed + unavailable + 1;

            let call = self.agent.execute(&prompt, &config);
            let result = match config.timeout {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or(Err(revisor_agent::AgentError::Timeout(limit))),
                None => call.await,
            };

            if let Ok(ref output) = result {
                self.record_usage(output.usage);
            }

            let failure = match result {
                Ok(output) if output.success() => {
                    info!(
                        %role,
                        attempt,
                        duration_secs = output.duration.as_secs_f64(),
                        "Role call completed"
                    );
                    match parse_output::<I::Output>(&output.text) {
                        Ok(parsed) => return Ok(parsed),
                        Err(source) => {
                            if malformed >= self.retry.malformed_retries {
                                return Err(RoleError::MalformedOutput {
                                    role,
                                    attempts: attempt,
                                    source,
                                });
                            }
                            malformed += 1;
                            (FailureKind::Malformed, source.to_string())
                        }
                    }
                }
                Ok(output) => {
                    let reason = format!(
                        "{} exited with code {}: {}",
                        self.agent.name(),
                        output.exit_code,
                        output.diagnostics.lines().last().unwrap_or_default()
                    );
                    self.generation_failure(role, attempt, &mut unavailable, reason)?
                }
                Err(e) => self.generation_failure(role, attempt, &mut unavailable, e.to_string())?,
            };

            let (kind, reason) = failure;
            self.notify(RetryNotice {
                role,
                attempt,
                kind,
                reason,
            });

            if kind == FailureKind::Unavailable {
                tokio::time::sleep(self.retry.backoff_for(unavailable)).await;
            }
        }
    }

    fn generation_failure(
        &self,
        role: RoleKind,
        attempt: u32,
        unavailable: &mut u32,
        reason: String,
    ) -> Result<(FailureKind, String), RoleError> {
        if *unavailable >= self.retry.generation_retries {
            return Err(RoleError::GenerationUnavailable {
                role,
                attempts: attempt,
                reason,
            });
        }
        *unavailable += 1;
        Ok((FailureKind::Unavailable, reason))
    }
}
