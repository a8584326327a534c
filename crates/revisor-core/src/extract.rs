use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use revisor_logging::{AuditRecord, NOT_ANSWERABLE};
use revisor_roles::RoleKind;

use crate::error::RevisionError;
use crate::state::{FinalAnswer, RevisionState};

/// What the caller of a revision gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionResponse {
    /// `None` when the question should not be answered
    pub final_answer: Option<String>,
    pub previous_score: Option<u8>,
    pub new_score: Option<u8>,
}

/// Reported outcome of a finished revision
#[derive(Debug, Clone)]
pub struct RevisionResult {
    /// Final answer after the reporting rules were applied
    pub answer: FinalAnswer,
    pub response: RevisionResponse,
    pub audit: AuditRecord,
}

/// Turns a terminal [`RevisionState`] into the reported result
pub struct ResultExtractor {
    accept_threshold: u8,
}

impl ResultExtractor {
    pub fn new(accept_threshold: u8) -> Self {
        Self { accept_threshold }
    }

    /// Apply the score rules on top of the decided answer.
    ///
    /// A scored revision at or below the threshold is never reported, even
    /// when the decider accepted it; an original above the threshold always
    /// wins.
    pub fn reported_answer(&self, state: &RevisionState, decided: &FinalAnswer) -> FinalAnswer {
        let mut answer = decided.clone();

        if let Some(new_score) = state.new_score {
            if new_score <= self.accept_threshold && answer != FinalAnswer::DoNotAnswer {
                warn!(
                    request_id = %state.request_id,
                    new_score,
                    decided = decided.kind(),
                    "Revision score below threshold, reporting as not answerable"
                );
                answer = FinalAnswer::DoNotAnswer;
            }
        }

        if let Some(previous_score) = state.original_score {
            if previous_score > self.accept_threshold {
                answer = FinalAnswer::Original(state.original_answer.clone());
            }
        }

        answer
    }

    pub fn extract(&self, state: &RevisionState) -> Result<RevisionResult, RevisionError> {
        let decided = state.final_answer().ok_or_else(|| {
            RevisionError::violation(RoleKind::Decider, "revision ended without a final answer")
        })?;
        let original_score = state.original_score.ok_or_else(|| {
            RevisionError::violation(
                RoleKind::ContextualReviewer,
                "revision ended before the original answer was scored",
            )
        })?;

        let answer = self.reported_answer(state, decided);

        let response = RevisionResponse {
            final_answer: answer.text().map(String::from),
            previous_score: Some(original_score),
            new_score: state.new_score,
        };

        let justification = state
            .decision
            .as_ref()
            .map(|v| v.justification.clone())
            .or_else(|| state.decline_reason.clone())
            .unwrap_or_default();

        let audit = AuditRecord {
            request_id: state.request_id.clone(),
            timestamp: Utc::now(),
            question: state.question.clone(),
            original_answer: state.original_answer.clone(),
            original_score,
            original_feedback: state.feedback.clone().unwrap_or_default(),
            original_justification: state
                .original_assessment
                .as_ref()
                .map(|a| a.feedback())
                .unwrap_or_default(),
            suggestions: state.issued_suggestions.clone().unwrap_or_default(),
            revised_answer: state.latest_revision().unwrap_or_default().to_string(),
            final_score: state.new_score,
            final_answer: answer.text().unwrap_or(NOT_ANSWERABLE).to_string(),
            decision: state
                .decision
                .as_ref()
                .map(|v| v.decision.to_string())
                .unwrap_or_default(),
            justification,
            revisions: state.revision_count,
            language: state.language.to_string(),
            intent: state.intent.clone().unwrap_or_default(),
            category: state.category.clone(),
            token_usage: state.token_usage.map(|u| u.total()),
        };

        Ok(RevisionResult {
            answer,
            response,
            audit,
        })
    }
}
