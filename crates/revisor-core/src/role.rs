//! The five revision roles.
//!
//! Each role builds its declared input view from the state, makes one
//! (retried) backend call through the [`RoleInvoker`], and turns the typed
//! reply into a [`StateDelta`] plus a [`Routing`]. The reply-to-delta step
//! is a plain function of the state so it can be tested without a backend.

use async_trait::async_trait;

use revisor_roles::{
    ContextualInput, Decision, DeciderInput, EvaluationTarget, Judgment, Rewrite, RewriterInput,
    RoleInvoker, RoleKind, ScoredAnswer, SemanticInput, Suggestion, SuggesterInput, Verdict,
};
use tracing::warn;

use crate::error::RevisionError;
use crate::state::{Assessment, Dimension, FinalAnswer, RevisionState, Routing, StateDelta};

/// One step of the revision protocol
#[async_trait]
pub trait Role: Send + Sync {
    fn kind(&self) -> RoleKind;

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError>;
}

pub struct SemanticReviewer;

impl SemanticReviewer {
    pub fn input(state: &RevisionState) -> SemanticInput<'_> {
        SemanticInput {
            question: &state.question,
            category: &state.category,
            intent: state.intent.as_deref(),
            language: state.language,
            target: state.target,
            answer: state.current_answer(),
        }
    }

    pub fn transition(judgment: Judgment) -> (StateDelta, Routing) {
        (
            StateDelta::Scored {
                dimension: Dimension::Semantic,
                judgment,
            },
            Routing::ContinueTo(RoleKind::ContextualReviewer),
        )
    }
}

#[async_trait]
impl Role for SemanticReviewer {
    fn kind(&self) -> RoleKind {
        RoleKind::SemanticReviewer
    }

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let judgment = invoker.invoke(&Self::input(state)).await?;
        Ok(Self::transition(judgment))
    }
}

pub struct ContextualReviewer {
    /// Original answers scoring above this are accepted as they are
    pub accept_threshold: u8,
}

impl ContextualReviewer {
    pub fn input(state: &RevisionState) -> ContextualInput<'_> {
        ContextualInput {
            question: &state.question,
            category: &state.category,
            intent: state.intent.as_deref(),
            context: &state.context,
            metadata: &state.metadata,
            target: state.target,
            answer: state.current_answer(),
        }
    }

    pub fn transition(
        &self,
        state: &RevisionState,
        judgment: Judgment,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let semantic = state
            .current_assessment()
            .semantic
            .as_ref()
            .ok_or_else(|| {
                RevisionError::violation(self.kind(), "no semantic score for the current answer")
            })?;
        let aggregate = semantic.score + judgment.score;

        let routing = match state.target {
            EvaluationTarget::Original if aggregate > self.accept_threshold => {
                Routing::Terminate(FinalAnswer::Original(state.original_answer.clone()))
            }
            EvaluationTarget::Original => Routing::ContinueTo(RoleKind::Suggester),
            EvaluationTarget::Revised => Routing::ContinueTo(RoleKind::Decider),
        };

        Ok((
            StateDelta::Scored {
                dimension: Dimension::Contextual,
                judgment,
            },
            routing,
        ))
    }
}

#[async_trait]
impl Role for ContextualReviewer {
    fn kind(&self) -> RoleKind {
        RoleKind::ContextualReviewer
    }

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let judgment = invoker.invoke(&Self::input(state)).await?;
        self.transition(state, judgment)
    }
}

pub struct Suggester;

impl Suggester {
    pub fn input(state: &RevisionState) -> Result<SuggesterInput<'_>, RevisionError> {
        let (Some(semantic), Some(contextual)) = (&state.baseline.semantic, &state.baseline.contextual)
        else {
            return Err(RevisionError::violation(
                RoleKind::Suggester,
                "baseline answer has not been fully reviewed",
            ));
        };
        Ok(SuggesterInput {
            question: &state.question,
            category: &state.category,
            context: &state.context,
            metadata: &state.metadata,
            answer: &state.baseline_answer,
            semantic,
            contextual,
        })
    }

    pub fn transition(suggestion: Suggestion) -> (StateDelta, Routing) {
        (
            StateDelta::Suggested(suggestion.suggestions),
            Routing::ContinueTo(RoleKind::Rewriter),
        )
    }
}

#[async_trait]
impl Role for Suggester {
    fn kind(&self) -> RoleKind {
        RoleKind::Suggester
    }

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let suggestion = invoker.invoke(&Self::input(state)?).await?;
        Ok(Self::transition(suggestion))
    }
}

pub struct Rewriter;

impl Rewriter {
    pub fn input(state: &RevisionState) -> RewriterInput<'_> {
        RewriterInput {
            question: &state.question,
            category: &state.category,
            intent: state.intent.as_deref(),
            language: state.language,
            context: &state.context,
            metadata: &state.metadata,
            answer: &state.baseline_answer,
            suggestions: state.suggestions.as_deref(),
            decider_feedback: state.guidance.as_deref(),
        }
    }

    pub fn transition(rewrite: Rewrite) -> (StateDelta, Routing) {
        match rewrite {
            Rewrite::Revised { revised_answer } => (
                StateDelta::Rewritten(revised_answer),
                Routing::ContinueTo(RoleKind::SemanticReviewer),
            ),
            Rewrite::CannotRewrite { reason } => (
                StateDelta::RewriteDeclined(reason),
                Routing::Terminate(FinalAnswer::DoNotAnswer),
            ),
        }
    }
}

#[async_trait]
impl Role for Rewriter {
    fn kind(&self) -> RoleKind {
        RoleKind::Rewriter
    }

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let rewrite = invoker.invoke(&Self::input(state)).await?;
        Ok(Self::transition(rewrite))
    }
}

pub struct Decider {
    /// Rewrites allowed per request
    pub revision_cap: u32,
}

impl Decider {
    pub fn input<'s>(&self, state: &'s RevisionState) -> Result<DeciderInput<'s>, RevisionError> {
        let missing = || {
            RevisionError::violation(
                RoleKind::Decider,
                "both answers must be fully reviewed before a decision",
            )
        };
        let previous = scored(&state.baseline_answer, &state.baseline).ok_or_else(missing)?;
        let revised_answer = state.revised_answer.as_deref().ok_or_else(missing)?;
        let revised = scored(revised_answer, &state.revised).ok_or_else(missing)?;

        Ok(DeciderInput {
            question: &state.question,
            context: &state.context,
            metadata: &state.metadata,
            original_answer: &state.original_answer,
            previous,
            revised,
            suggestions: state.suggestions.as_deref(),
            revision_count: state.revision_count,
            revision_cap: self.revision_cap,
        })
    }

    pub fn transition(
        &self,
        state: &RevisionState,
        verdict: Verdict,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let answer = match verdict.decision {
            Decision::AnswerOriginal => FinalAnswer::Original(state.original_answer.clone()),
            Decision::AnswerRevised => {
                let revised = state.revised_answer.clone().ok_or_else(|| {
                    RevisionError::violation(self.kind(), "ANSWER_REVISED without a revision")
                })?;
                FinalAnswer::Revised(revised)
            }
            Decision::DoNotAnswer => FinalAnswer::DoNotAnswer,
            Decision::Rewrite if state.revision_count >= self.revision_cap => {
                warn!(
                    revision_count = state.revision_count,
                    revision_cap = self.revision_cap,
                    "Rewrite requested past the revision cap, not answering"
                );
                let forced = Verdict {
                    decision: Decision::DoNotAnswer,
                    justification: format!(
                        "Revision cap of {} reached. {}",
                        self.revision_cap, verdict.justification
                    ),
                };
                return Ok((
                    StateDelta::Decided {
                        verdict: forced,
                        cap_reached: true,
                    },
                    Routing::Terminate(FinalAnswer::DoNotAnswer),
                ));
            }
            Decision::Rewrite => {
                return Ok((
                    StateDelta::Decided {
                        verdict,
                        cap_reached: false,
                    },
                    Routing::ContinueTo(RoleKind::Rewriter),
                ));
            }
        };

        Ok((
            StateDelta::Decided {
                verdict,
                cap_reached: false,
            },
            Routing::Terminate(answer),
        ))
    }
}

fn scored<'s>(answer: &'s str, assessment: &'s Assessment) -> Option<ScoredAnswer<'s>> {
    Some(ScoredAnswer {
        answer,
        semantic: assessment.semantic.as_ref()?,
        contextual: assessment.contextual.as_ref()?,
        aggregate: assessment.aggregate()?,
    })
}

#[async_trait]
impl Role for Decider {
    fn kind(&self) -> RoleKind {
        RoleKind::Decider
    }

    async fn evaluate(
        &self,
        state: &RevisionState,
        invoker: &RoleInvoker<'_>,
    ) -> Result<(StateDelta, Routing), RevisionError> {
        let verdict = invoker.invoke(&self.input(state)?).await?;
        self.transition(state, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RevisionRequest;

    fn judgment(score: u8) -> Judgment {
        Judgment {
            score,
            justification: "ok".into(),
        }
    }

    fn verdict(decision: Decision) -> Verdict {
        Verdict {
            decision,
            justification: "because".into(),
        }
    }

    fn original_state(semantic: u8) -> RevisionState {
        let mut state = RevisionState::new("req", &RevisionRequest::new("q", "original"));
        let (delta, _) = SemanticReviewer::transition(judgment(semantic));
        state.apply(delta).unwrap();
        state
    }

    /// State with the original reviewed at 2+2 and one revision reviewed
    fn decider_state(revision_count: u32) -> RevisionState {
        let contextual = ContextualReviewer { accept_threshold: 7 };
        let mut state = original_state(2);
        let (delta, _) = contextual.transition(&state, judgment(2)).unwrap();
        state.apply(delta).unwrap();
        state.apply(StateDelta::Suggested("s".into())).unwrap();
        state.apply(StateDelta::Rewritten("revised".into())).unwrap();
        state.apply(score(Dimension::Semantic, 3)).unwrap();
        state.apply(score(Dimension::Contextual, 3)).unwrap();
        state.revision_count = revision_count;
        state
    }

    fn score(dimension: Dimension, score: u8) -> StateDelta {
        StateDelta::Scored {
            dimension,
            judgment: judgment(score),
        }
    }

    #[test]
    fn test_contextual_accepts_original_above_threshold() {
        let role = ContextualReviewer { accept_threshold: 7 };
        let state = original_state(4);

        let (_, routing) = role.transition(&state, judgment(4)).unwrap();
        assert_eq!(
            routing,
            Routing::Terminate(FinalAnswer::Original("original".into()))
        );

        let (_, routing) = role.transition(&state, judgment(3)).unwrap();
        assert_eq!(routing, Routing::ContinueTo(RoleKind::Suggester));
    }

    #[test]
    fn test_contextual_sends_revision_to_decider_whatever_the_score() {
        let role = ContextualReviewer { accept_threshold: 7 };
        let mut state = decider_state(1);
        state.revised.contextual = None;
        state.new_score = None;

        for score in [0, 5] {
            let (_, routing) = role.transition(&state, judgment(score)).unwrap();
            assert_eq!(routing, Routing::ContinueTo(RoleKind::Decider));
        }
    }

    #[test]
    fn test_cannot_rewrite_terminates() {
        let (delta, routing) = Rewriter::transition(Rewrite::CannotRewrite {
            reason: "no data".into(),
        });
        assert_eq!(delta, StateDelta::RewriteDeclined("no data".into()));
        assert_eq!(routing, Routing::Terminate(FinalAnswer::DoNotAnswer));
    }

    #[test]
    fn test_decider_routes_each_decision() {
        let decider = Decider { revision_cap: 2 };
        let state = decider_state(1);

        let (_, routing) = decider
            .transition(&state, verdict(Decision::AnswerOriginal))
            .unwrap();
        assert_eq!(
            routing,
            Routing::Terminate(FinalAnswer::Original("original".into()))
        );

        let (_, routing) = decider
            .transition(&state, verdict(Decision::AnswerRevised))
            .unwrap();
        assert_eq!(
            routing,
            Routing::Terminate(FinalAnswer::Revised("revised".into()))
        );

        let (_, routing) = decider.transition(&state, verdict(Decision::Rewrite)).unwrap();
        assert_eq!(routing, Routing::ContinueTo(RoleKind::Rewriter));
    }

    #[test]
    fn test_rewrite_at_cap_is_forced_to_do_not_answer() {
        let decider = Decider { revision_cap: 2 };
        let state = decider_state(2);

        let (delta, routing) = decider.transition(&state, verdict(Decision::Rewrite)).unwrap();
        assert_eq!(routing, Routing::Terminate(FinalAnswer::DoNotAnswer));
        match delta {
            StateDelta::Decided {
                verdict,
                cap_reached,
            } => {
                assert!(cap_reached);
                assert_eq!(verdict.decision, Decision::DoNotAnswer);
                assert!(verdict.justification.contains("because"));
            }
            other => panic!("unexpected delta: {:?}", other),
        }
    }

    #[test]
    fn test_decider_input_carries_both_scored_answers() {
        let decider = Decider { revision_cap: 2 };
        let state = decider_state(1);
        let input = decider.input(&state).unwrap();

        assert_eq!(input.previous.answer, "original");
        assert_eq!(input.previous.aggregate, 4);
        assert_eq!(input.revised.answer, "revised");
        assert_eq!(input.revised.aggregate, 6);
        assert_eq!(input.revision_cap, 2);
    }

    #[test]
    fn test_suggester_needs_reviewed_baseline() {
        let state = original_state(2);
        assert!(Suggester::input(&state).is_err());
    }
}
