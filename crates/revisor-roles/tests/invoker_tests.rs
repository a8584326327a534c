use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use revisor_agent::{Agent, AgentConfig, AgentError, AgentOutput, AgentType, Prompt, TokenUsage};
use revisor_roles::{
    EvaluationTarget, FailureKind, Judgment, Language, RetryNotice, RetryPolicy, RoleError,
    RoleInvoker, RoleKind, SemanticInput,
};

enum Reply {
    Text(&'static str),
    Billed(&'static str, TokenUsage),
    ExitCode(i32),
    Fail,
    Hang,
}

/// Backend double that plays back a fixed list of replies
struct ScriptedAgent {
    replies: Mutex<VecDeque<Reply>>,
    models: Mutex<Vec<Option<String>>>,
}

impl ScriptedAgent {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            models: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.models.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn agent_type(&self) -> AgentType {
        AgentType::OpenAi
    }

    async fn execute(
        &self,
        _prompt: &Prompt,
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        self.models.lock().unwrap().push(config.model.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("script exhausted");
        match reply {
            Reply::Text(text) => Ok(AgentOutput::new(
                text.to_string(),
                String::new(),
                0,
                Duration::ZERO,
            )),
            Reply::Billed(text, usage) => Ok(AgentOutput::new(
                text.to_string(),
                String::new(),
                0,
                Duration::ZERO,
            )
            .with_usage(usage)),
            Reply::ExitCode(code) => Ok(AgentOutput::new(
                String::new(),
                "boom".into(),
                code,
                Duration::ZERO,
            )),
            Reply::Fail => Err(AgentError::ExecutionFailed("connection refused".into())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(AgentError::ExecutionFailed("unreachable".into()))
            }
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn input() -> SemanticInput<'static> {
    SemanticInput {
        question: "Is product X waterproof?",
        category: "electronics",
        intent: Some("specification"),
        language: Language::Spanish,
        target: EvaluationTarget::Original,
        answer: "Yes, up to 30 meters.",
    }
}

fn fast_retries() -> RetryPolicy {
    RetryPolicy {
        malformed_retries: 2,
        generation_retries: 2,
        backoff: Duration::ZERO,
    }
}

const GOOD: &str = r#"<output>{"score": 5, "justification": "Direct answer."}</output>"#;

#[tokio::test]
async fn test_invoke_parses_typed_reply() {
    let agent = ScriptedAgent::new(vec![Reply::Text(GOOD)]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default());

    let judgment: Judgment = invoker.invoke(&input()).await.unwrap();
    assert_eq!(judgment.score, 5);
    assert_eq!(agent.calls(), 1);
}

#[tokio::test]
async fn test_malformed_reply_is_retried() {
    let agent = ScriptedAgent::new(vec![
        Reply::Text("Score: 5/5"),
        Reply::Text(r#"<output>{"score": 8, "justification": "too high"}</output>"#),
        Reply::Text(GOOD),
    ]);
    let notices: Arc<Mutex<Vec<RetryNotice>>> = Arc::default();
    let sink = notices.clone();
    let invoker = RoleInvoker::new(&agent, AgentConfig::default())
        .with_retry_policy(fast_retries())
        .with_retry_callback(Arc::new(move |n: &RetryNotice| {
            sink.lock().unwrap().push(n.clone())
        }));

    let judgment = invoker.invoke(&input()).await.unwrap();
    assert_eq!(judgment.score, 5);

    let notices = notices.lock().unwrap();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.kind == FailureKind::Malformed));
    assert_eq!(notices[1].attempt, 2);
}

#[tokio::test]
async fn test_malformed_budget_exhausted_is_fatal() {
    let agent = ScriptedAgent::new(vec![
        Reply::Text("no block"),
        Reply::Text("no block"),
        Reply::Text("no block"),
    ]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default()).with_retry_policy(fast_retries());

    let err = invoker.invoke(&input()).await.unwrap_err();
    assert!(matches!(
        err,
        RoleError::MalformedOutput {
            role: RoleKind::SemanticReviewer,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(agent.calls(), 3);
}

#[tokio::test]
async fn test_generation_failures_are_retried_then_fatal() {
    let agent = ScriptedAgent::new(vec![Reply::Fail, Reply::ExitCode(1), Reply::Text(GOOD)]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default()).with_retry_policy(fast_retries());
    assert!(invoker.invoke(&input()).await.is_ok());

    let agent = ScriptedAgent::new(vec![Reply::Fail, Reply::Fail, Reply::Fail]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default()).with_retry_policy(fast_retries());
    let err = invoker.invoke(&input()).await.unwrap_err();
    assert!(matches!(err, RoleError::GenerationUnavailable { attempts: 3, .. }));
}

#[tokio::test]
async fn test_per_call_timeout_counts_as_unavailable() {
    let agent = ScriptedAgent::new(vec![Reply::Hang, Reply::Text(GOOD)]);
    let config = AgentConfig::default().with_timeout(Duration::from_millis(20));
    let invoker = RoleInvoker::new(&agent, config).with_retry_policy(fast_retries());

    let judgment = invoker.invoke(&input()).await.unwrap();
    assert_eq!(judgment.score, 5);
    assert_eq!(agent.calls(), 2);
}

#[tokio::test]
async fn test_role_model_override() {
    let agent = ScriptedAgent::new(vec![Reply::Text(GOOD)]);
    let config = AgentConfig::default().with_model("base-model".into());
    let invoker = RoleInvoker::new(&agent, config).with_role_models(HashMap::from([(
        RoleKind::SemanticReviewer,
        "reviewer-model".to_string(),
    )]));

    invoker.invoke(&input()).await.unwrap();
    assert_eq!(
        agent.models.lock().unwrap()[0].as_deref(),
        Some("reviewer-model")
    );
}

#[test]
fn test_backoff_doubles() {
    let policy = RetryPolicy {
        backoff: Duration::from_millis(100),
        ..RetryPolicy::default()
    };
    assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
    assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
    assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
}

#[tokio::test]
async fn test_usage_summed_across_retries() {
    let agent = ScriptedAgent::new(vec![
        Reply::Billed("no block here", TokenUsage::new(400, 20)),
        Reply::Fail,
        Reply::Billed(GOOD, TokenUsage::new(410, 35)),
    ]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default()).with_retry_policy(fast_retries());
    assert_eq!(invoker.usage(), None);

    let judgment: Judgment = invoker.invoke(&input()).await.unwrap();
    assert_eq!(judgment.score, 5);
    assert_eq!(invoker.usage(), Some(TokenUsage::new(810, 55)));
}

#[tokio::test]
async fn test_usage_absent_when_backend_reports_none() {
    let agent = ScriptedAgent::new(vec![Reply::Text(GOOD)]);
    let invoker = RoleInvoker::new(&agent, AgentConfig::default());

    let _: Judgment = invoker.invoke(&input()).await.unwrap();
    assert_eq!(invoker.usage(), None);
}
