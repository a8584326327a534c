use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use revisor_agent::TokenUsage;
use revisor_roles::{Decision, EvaluationTarget, Judgment, Language, RoleKind, Verdict};

use crate::error::RevisionError;
use crate::request::RevisionRequest;

/// Which reviewer produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Semantic,
    Contextual,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Semantic => "semantic",
            Dimension::Contextual => "contextual",
        }
    }

    fn role(&self) -> RoleKind {
        match self {
            Dimension::Semantic => RoleKind::SemanticReviewer,
            Dimension::Contextual => RoleKind::ContextualReviewer,
        }
    }
}

/// Both reviews of one answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub semantic: Option<Judgment>,
    pub contextual: Option<Judgment>,
}

impl Assessment {
    /// Semantic plus contextual score, once both are in
    pub fn aggregate(&self) -> Option<u8> {
        match (&self.semantic, &self.contextual) {
            (Some(s), Some(c)) => Some(s.score + c.score),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.semantic.is_some() && self.contextual.is_some()
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut Option<Judgment> {
        match dimension {
            Dimension::Semantic => &mut self.semantic,
            Dimension::Contextual => &mut self.contextual,
        }
    }

    /// Both justifications as one line of feedback
    pub fn feedback(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref j) = self.semantic {
            parts.push(format!("Semantic ({}): {}", j.score, j.justification));
        }
        if let Some(ref j) = self.contextual {
            parts.push(format!("Contextual ({}): {}", j.score, j.justification));
        }
        parts.join(" | ")
    }
}

/// The answer a revision ends with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum FinalAnswer {
    Original(String),
    Revised(String),
    DoNotAnswer,
}

impl FinalAnswer {
    pub fn text(&self) -> Option<&str> {
        match self {
            FinalAnswer::Original(text) | FinalAnswer::Revised(text) => Some(text),
            FinalAnswer::DoNotAnswer => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FinalAnswer::Original(_) => "original",
            FinalAnswer::Revised(_) => "revised",
            FinalAnswer::DoNotAnswer => "do_not_answer",
        }
    }
}

/// What a role asks the orchestrator to run next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    ContinueTo(RoleKind),
    Terminate(FinalAnswer),
}

/// The change a role makes to the revision state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateDelta {
    Scored {
        dimension: Dimension,
        judgment: Judgment,
    },
    Suggested(String),
    Rewritten(String),
    RewriteDeclined(String),
    Decided {
        verdict: Verdict,
        /// The decider asked for another rewrite past the revision cap
        cap_reached: bool,
    },
}

impl StateDelta {
    /// One-line description for the step trail
    pub fn summary(&self) -> String {
        match self {
            StateDelta::Scored {
                dimension,
                judgment,
            } => format!("{} score {}", dimension.as_str(), judgment.score),
            StateDelta::Suggested(_) => "suggestions recorded".to_string(),
            StateDelta::Rewritten(text) => format!("revised answer ({} chars)", text.chars().count()),
            StateDelta::RewriteDeclined(_) => "cannot rewrite".to_string(),
            StateDelta::Decided {
                verdict,
                cap_reached: true,
            } => format!("{} (revision cap reached)", verdict.decision),
            StateDelta::Decided { verdict, .. } => verdict.decision.to_string(),
        }
    }
}

/// One role invocation in the step trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub role: RoleKind,
    pub target: EvaluationTarget,
    pub summary: String,
    pub duration_secs: f64,
}

/// Everything one revision run knows. Owned by a single orchestration run.
#[derive(Debug, Clone)]
pub struct RevisionState {
    pub request_id: String,

    pub question: String,
    pub original_answer: String,
    /// Prior feedback on the original answer, as sent by the caller
    pub feedback: Option<String>,
    pub category: String,
    pub intent: Option<String>,
    pub language: Language,
    pub context: Value,
    pub metadata: Value,

    /// Which answer the reviewers are scoring
    pub target: EvaluationTarget,
    /// The answer being improved on: the original, or the last revision the
    /// decider sent back for another rewrite
    pub baseline_answer: String,
    pub baseline: Assessment,
    /// Scores of the current revision candidate
    pub revised: Assessment,
    pub revised_answer: Option<String>,

    /// Aggregate of the customer's original answer
    pub original_score: Option<u8>,
    /// Reviews of the customer's original answer
    pub original_assessment: Option<Assessment>,
    /// Aggregate of the latest revision candidate
    pub new_score: Option<u8>,

    pub suggestions: Option<String>,
    /// Suggestions as first issued; kept for the results log
    pub issued_suggestions: Option<String>,
    /// Decider feedback for the next rewrite
    pub guidance: Option<String>,
    pub decline_reason: Option<String>,
    pub decision: Option<Verdict>,
    pub cap_reached: bool,
    pub revision_count: u32,

    pub steps: Vec<StepRecord>,
    /// Tokens used by every role call so far, when the backend reports usage
    pub token_usage: Option<TokenUsage>,
    final_answer: Option<FinalAnswer>,
    started_at: Instant,
}

impl RevisionState {
    pub fn new(request_id: impl Into<String>, request: &RevisionRequest) -> Self {
        Self {
            request_id: request_id.into(),
            question: request.question.clone(),
            original_answer: request.answer.clone(),
            feedback: request.feedback.clone(),
            category: request.category.clone(),
            intent: request.intent_name().map(String::from),
            language: request.language(),
            context: request.context.clone(),
            metadata: request.metadata.clone(),
            target: EvaluationTarget::Original,
            baseline_answer: request.answer.clone(),
            baseline: Assessment::default(),
            revised: Assessment::default(),
            revised_answer: None,
            original_score: None,
            original_assessment: None,
            new_score: None,
            suggestions: None,
            issued_suggestions: None,
            guidance: None,
            decline_reason: None,
            decision: None,
            cap_reached: false,
            revision_count: 0,
            steps: Vec::new(),
            token_usage: None,
            final_answer: None,
            started_at: Instant::now(),
        }
    }

    /// The answer currently under review
    pub fn current_answer(&self) -> &str {
        match self.target {
            EvaluationTarget::Original => &self.baseline_answer,
            EvaluationTarget::Revised => self
                .revised_answer
                .as_deref()
                .unwrap_or(&self.baseline_answer),
        }
    }

    /// The assessment slot reviewers write to for the current target
    pub fn current_assessment(&self) -> &Assessment {
        match self.target {
            EvaluationTarget::Original => &self.baseline,
            EvaluationTarget::Revised => &self.revised,
        }
    }

    fn current_assessment_mut(&mut self) -> &mut Assessment {
        match self.target {
            EvaluationTarget::Original => &mut self.baseline,
            EvaluationTarget::Revised => &mut self.revised,
        }
    }

    /// The latest revision produced, even if it was later promoted to baseline
    pub fn latest_revision(&self) -> Option<&str> {
        self.revised_answer
            .as_deref()
            .or_else(|| (self.revision_count > 0).then_some(self.baseline_answer.as_str()))
    }

    pub fn final_answer(&self) -> Option<&FinalAnswer> {
        self.final_answer.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Apply one role's delta, checking it is legal in the current state
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), RevisionError> {
        if self.final_answer.is_some() {
            return Err(RevisionError::violation(
                delta_role(&delta),
                "state already has a final answer",
            ));
        }

        match delta {
            StateDelta::Scored {
                dimension,
                judgment,
            } => self.record_score(dimension, judgment),
            StateDelta::Suggested(text) => {
                let role = RoleKind::Suggester;
                if self.target != EvaluationTarget::Original || !self.baseline.is_complete() {
                    return Err(RevisionError::violation(
                        role,
                        "suggestions need a fully reviewed baseline answer",
                    ));
                }
                self.issued_suggestions.get_or_insert_with(|| text.clone());
                self.suggestions = Some(text);
                Ok(())
            }
            StateDelta::Rewritten(text) => {
                self.check_rewrite_ready()?;
                self.revised_answer = Some(text);
                self.revised = Assessment::default();
                self.revision_count += 1;
                self.target = EvaluationTarget::Revised;
                Ok(())
            }
            StateDelta::RewriteDeclined(reason) => {
                self.check_rewrite_ready()?;
                self.decline_reason = Some(reason);
                Ok(())
            }
            StateDelta::Decided {
                verdict,
                cap_reached,
            } => self.record_verdict(verdict, cap_reached),
        }
    }

    fn record_score(&mut self, dimension: Dimension, judgment: Judgment) -> Result<(), RevisionError> {
        let role = dimension.role();
        let target = self.target;
        let assessment = self.current_assessment_mut();

        if dimension == Dimension::Contextual && assessment.semantic.is_none() {
            return Err(RevisionError::violation(
                role,
                "contextual review ran before the semantic review",
            ));
        }
        let slot = assessment.slot_mut(dimension);
        if slot.is_some() {
            return Err(RevisionError::violation(
                role,
                format!("{} answer already has a {} score", target_name(target), dimension.as_str()),
            ));
        }
        *slot = Some(judgment);

        if let Some(aggregate) = self.current_assessment().aggregate() {
            match target {
                EvaluationTarget::Original => {
                    if self.original_score.is_none() {
                        self.original_score = Some(aggregate);
                        self.original_assessment = Some(self.baseline.clone());
                    }
                }
                EvaluationTarget::Revised => self.new_score = Some(aggregate),
            }
        }
        Ok(())
    }

    fn check_rewrite_ready(&self) -> Result<(), RevisionError> {
        if self.target != EvaluationTarget::Original {
            return Err(RevisionError::violation(
                RoleKind::Rewriter,
                "rewrite requested while a revision is still under review",
            ));
        }
        if self.suggestions.is_none() && self.guidance.is_none() {
            return Err(RevisionError::violation(
                RoleKind::Rewriter,
                "rewrite requested without suggestions or decider feedback",
            ));
        }
        Ok(())
    }

    fn record_verdict(&mut self, verdict: Verdict, cap_reached: bool) -> Result<(), RevisionError> {
        let role = RoleKind::Decider;
        if self.target != EvaluationTarget::Revised || !self.revised.is_complete() {
            return Err(RevisionError::violation(
                role,
                "decision requested before the revision was fully reviewed",
            ));
        }
        if self.decision.is_some() {
            return Err(RevisionError::violation(role, "decision already recorded for this cycle"));
        }

        if verdict.decision == Decision::Rewrite {
            // Next cycle starts from the rejected revision
            let Some(revised_answer) = self.revised_answer.take() else {
                return Err(RevisionError::violation(role, "no revision to rewrite"));
            };
            self.baseline_answer = revised_answer;
            self.baseline = std::mem::take(&mut self.revised);
            self.new_score = None;
            self.suggestions = None;
            self.guidance = Some(verdict.justification);
            self.target = EvaluationTarget::Original;
            return Ok(());
        }

        self.cap_reached = cap_reached;
        self.decision = Some(verdict);
        Ok(())
    }

    /// Record the terminal answer. A second assignment is an error.
    pub fn finish(&mut self, role: RoleKind, answer: FinalAnswer) -> Result<(), RevisionError> {
        if self.final_answer.is_some() {
            return Err(RevisionError::violation(role, "final answer assigned twice"));
        }
        if answer.text().is_some_and(|t| t.trim().is_empty()) {
            return Err(RevisionError::violation(role, "final answer is empty"));
        }
        self.final_answer = Some(answer);
        Ok(())
    }

    pub(crate) fn push_step(&mut self, record: StepRecord) {
        self.steps.push(record);
    }
}

pub(crate) fn target_name(target: EvaluationTarget) -> &'static str {
    match target {
        EvaluationTarget::Original => "original",
        EvaluationTarget::Revised => "revised",
    }
}

fn delta_role(delta: &StateDelta) -> RoleKind {
    match delta {
        StateDelta::Scored { dimension, .. } => dimension.role(),
        StateDelta::Suggested(_) => RoleKind::Suggester,
        StateDelta::Rewritten(_) | StateDelta::RewriteDeclined(_) => RoleKind::Rewriter,
        StateDelta::Decided { .. } => RoleKind::Decider,
    }
}
