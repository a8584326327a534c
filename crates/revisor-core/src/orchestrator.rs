use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use revisor_agent::{Agent, AgentConfig};
use revisor_logging::{LogEvent, Logger};
use revisor_roles::{EvaluationTarget, RetryNotice, RetryPolicy, RoleInvoker, RoleKind, MAX_AGGREGATE_SCORE};
use tracing::{debug, info, warn};

use crate::error::RevisionError;
use crate::extract::{ResultExtractor, RevisionResult};
use crate::request::RevisionRequest;
use crate::role::{ContextualReviewer, Decider, Rewriter, Role, SemanticReviewer, Suggester};
use crate::state::{target_name, RevisionState, Routing, StateDelta, StepRecord};

/// Tunables for one revision run
#[derive(Debug, Clone)]
pub struct RevisionSettings {
    /// Original answers whose aggregate exceeds this are accepted unchanged
    pub accept_threshold: u8,
    pub revision_cap: u32,
    /// Hard limit on role invocations per request
    pub max_steps: usize,
    pub retry: RetryPolicy,
    /// Limit for a single backend call
    pub step_timeout: Duration,
    /// Limit for the whole run
    pub request_timeout: Duration,
    pub model: Option<String>,
    pub role_models: HashMap<RoleKind, String>,
    pub working_dir: PathBuf,
}

impl Default for RevisionSettings {
    fn default() -> Self {
        Self {
            accept_threshold: 7,
            revision_cap: 2,
            max_steps: 16,
            retry: RetryPolicy::default(),
            step_timeout: Duration::from_secs(90),
            request_timeout: Duration::from_secs(600),
            model: None,
            role_models: HashMap::new(),
            working_dir: PathBuf::from("."),
        }
    }
}

impl RevisionSettings {
    /// Steps in the longest legal run: two reviews and a suggestion, then
    /// one rewrite, two reviews and a decision per rewrite cycle
    pub fn longest_run(revision_cap: u32) -> usize {
        3 + 4 * revision_cap as usize
    }

    pub fn validate(&self) -> Result<(), RevisionError> {
        if self.accept_threshold > MAX_AGGREGATE_SCORE {
            return Err(RevisionError::ConfigError(format!(
                "accept_threshold {} is above the maximum aggregate score {}",
                self.accept_threshold, MAX_AGGREGATE_SCORE
            )));
        }
        if self.revision_cap == 0 {
            return Err(RevisionError::ConfigError(
                "revision_cap must be at least 1".to_string(),
            ));
        }
        let needed = Self::longest_run(self.revision_cap);
        if self.max_steps < needed {
            return Err(RevisionError::ConfigError(format!(
                "max_steps {} is too small for revision_cap {} (needs at least {})",
                self.max_steps, self.revision_cap, needed
            )));
        }
        Ok(())
    }

    fn agent_config(&self) -> AgentConfig {
        let config = AgentConfig::new(self.working_dir.clone()).with_timeout(self.step_timeout);
        match self.model {
            Some(ref model) => config.with_model(model.clone()),
            None => config,
        }
    }
}

/// Drives one revision request through the roles until a final answer is set
pub struct Orchestrator<'a> {
    agent: &'a dyn Agent,
    settings: RevisionSettings,
    logger: Arc<Logger>,
    roles: HashMap<RoleKind, Box<dyn Role>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(agent: &'a dyn Agent, settings: RevisionSettings, logger: Arc<Logger>) -> Self {
        let mut roles: HashMap<RoleKind, Box<dyn Role>> = HashMap::new();
        roles.insert(RoleKind::SemanticReviewer, Box::new(SemanticReviewer));
        roles.insert(
            RoleKind::ContextualReviewer,
            Box::new(ContextualReviewer {
                accept_threshold: settings.accept_threshold,
            }),
        );
        roles.insert(RoleKind::Suggester, Box::new(Suggester));
        roles.insert(RoleKind::Rewriter, Box::new(Rewriter));
        roles.insert(
            RoleKind::Decider,
            Box::new(Decider {
                revision_cap: settings.revision_cap,
            }),
        );

        Self {
            agent,
            settings,
            logger,
            roles,
        }
    }

    pub fn settings(&self) -> &RevisionSettings {
        &self.settings
    }

    /// Run the request and extract the reported result
    pub async fn revise(
        &self,
        request_id: &str,
        request: &RevisionRequest,
    ) -> Result<RevisionResult, RevisionError> {
        let state = self.run(request_id, request).await?;
        ResultExtractor::new(self.settings.accept_threshold).extract(&state)
    }

    /// Run the request to its terminal state
    pub async fn run(
        &self,
        request_id: &str,
        request: &RevisionRequest,
    ) -> Result<RevisionState, RevisionError> {
        let mut state = RevisionState::new(request_id, request);

        self.logger.log(&LogEvent::RevisionStarted {
            request_id: request_id.to_string(),
            question: request.question.clone(),
            language: state.language.to_string(),
        });

        let limit = self.settings.request_timeout;
        let result = match tokio::time::timeout(limit, self.drive(&mut state)).await {
            Ok(result) => result,
            Err(_) => Err(RevisionError::RequestTimeout(limit)),
        };

        match result {
            Ok(()) => {
                let answer = state.final_answer().map(|a| a.kind()).unwrap_or_default();
                let justification = state
                    .decision
                    .as_ref()
                    .map(|v| v.justification.clone())
                    .or_else(|| state.decline_reason.clone());
                self.logger.log(&LogEvent::RevisionCompleted {
                    request_id: request_id.to_string(),
                    outcome: answer.to_string(),
                    revisions: state.revision_count,
                    previous_score: state.original_score,
                    new_score: state.new_score,
                    justification,
                    prompt_tokens: state.token_usage.map(|u| u.prompt_tokens),
                    completion_tokens: state.token_usage.map(|u| u.completion_tokens),
                    duration_secs: state.elapsed().as_secs_f64(),
                });
                Ok(state)
            }
            Err(e) => {
                warn!(request_id, error = %e, "Revision failed");
                self.logger.log(&LogEvent::RevisionFailed {
                    request_id: request_id.to_string(),
                    error: e.to_string(),
                    duration_secs: state.elapsed().as_secs_f64(),
                });
                Err(e)
            }
        }
    }

    fn invoker(&self, request_id: &str) -> RoleInvoker<'a> {
        let logger = self.logger.clone();
        let request_id = request_id.to_string();
        RoleInvoker::new(self.agent, self.settings.agent_config())
            .with_retry_policy(self.settings.retry.clone())
            .with_role_models(self.settings.role_models.clone())
            .with_retry_callback(Arc::new(move |notice: &RetryNotice| {
                logger.log(&LogEvent::RoleRetried {
                    request_id: request_id.clone(),
                    role: notice.role.to_string(),
                    attempt: notice.attempt,
                    reason: notice.reason.clone(),
                });
            }))
    }

    async fn drive(&self, state: &mut RevisionState) -> Result<(), RevisionError> {
        let invoker = self.invoker(&state.request_id);
        let mut next = RoleKind::SemanticReviewer;

        for step in 0..self.settings.max_steps {
            let role = self.roles.get(&next).ok_or_else(|| {
                RevisionError::violation(next, "no role registered for this step")
            })?;
            let target = state.target;

            self.logger.log(&LogEvent::RoleStarted {
                request_id: state.request_id.clone(),
                step,
                role: next.to_string(),
                target: target_name(target).to_string(),
            });

            let started = Instant::now();
            debug!(step, role = %next, "Running role");
            let evaluated = role.evaluate(state, &invoker).await;
            state.token_usage = invoker.usage();
            let (delta, routing) = evaluated?;

            let summary = delta.summary();
            let scored = matches!(delta, StateDelta::Scored { .. });
            let score_event = match delta {
                StateDelta::Scored {
                    dimension,
                    ref judgment,
                } => Some((dimension, judgment.score)),
                _ => None,
            };
            let cap_reached = matches!(
                delta,
                StateDelta::Decided {
                    cap_reached: true,
                    ..
                }
            );

            state.apply(delta)?;

            let duration = started.elapsed();
            state.push_step(StepRecord {
                step,
                role: next,
                target,
                summary: summary.clone(),
                duration_secs: duration.as_secs_f64(),
            });

            if let Some((dimension, score)) = score_event {
                self.logger.log(&LogEvent::ScoreRecorded {
                    request_id: state.request_id.clone(),
                    target: target_name(target).to_string(),
                    dimension: dimension.as_str().to_string(),
                    score,
                });
            }
            self.logger.log(&LogEvent::RoleCompleted {
                request_id: state.request_id.clone(),
                step,
                role: next.to_string(),
                summary,
                duration_secs: duration.as_secs_f64(),
            });

            // Scores computed on the assessment the reviewers just finished
            let finished = match target {
                EvaluationTarget::Original => &state.baseline,
                EvaluationTarget::Revised => &state.revised,
            };
            if scored {
                if let (Some(aggregate), Some(s), Some(c)) =
                    (finished.aggregate(), &finished.semantic, &finished.contextual)
                {
                    self.logger.log(&LogEvent::AggregateComputed {
                        request_id: state.request_id.clone(),
                        target: target_name(target).to_string(),
                        semantic: s.score,
                        contextual: c.score,
                        aggregate,
                    });
                }
            }

            if cap_reached {
                self.logger.log(&LogEvent::RevisionCapReached {
                    request_id: state.request_id.clone(),
                    revisions: state.revision_count,
                });
            }

            match routing {
                Routing::ContinueTo(kind) => next = kind,
                Routing::Terminate(answer) => {
                    info!(
                        request_id = %state.request_id,
                        answer = answer.kind(),
                        revisions = state.revision_count,
                        "Revision finished"
                    );
                    return state.finish(next, answer);
                }
            }
        }

        Err(RevisionError::CycleLimitExceeded {
            max_steps: self.settings.max_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        RevisionSettings::default().validate().unwrap();
    }

    #[test]
    fn test_max_steps_must_cover_longest_run() {
        assert_eq!(RevisionSettings::longest_run(2), 11);

        let settings = RevisionSettings {
            revision_cap: 4,
            max_steps: 18,
            ..RevisionSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(RevisionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_threshold_and_cap_bounds() {
        let settings = RevisionSettings {
            accept_threshold: 11,
            ..RevisionSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = RevisionSettings {
            revision_cap: 0,
            ..RevisionSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
