use revisor_agent::Prompt;

use crate::output::MAX_DIMENSION_SCORE;
use crate::{RoleInput, RoleKind};

/// Prompt templates for the revision roles
pub struct RolePrompts;

impl RolePrompts {
    /// Build the prompt for a role from its declared input view
    pub fn build<I: RoleInput>(input: &I) -> Result<Prompt, serde_json::Error> {
        let data = serde_json::to_string_pretty(input)?;
        Ok(Prompt::new(
            Self::system_contract(I::KIND),
            format!(
                "Use only the following data for this step.\n\n```json\n{data}\n```"
            ),
        ))
    }

    /// The role's standing instructions, including its reply format
    pub fn system_contract(kind: RoleKind) -> String {
        let body = match kind {
            RoleKind::SemanticReviewer => semantic_contract(),
            RoleKind::ContextualReviewer => contextual_contract(),
            RoleKind::Suggester => SUGGESTER_CONTRACT.to_string(),
            RoleKind::Rewriter => REWRITER_CONTRACT.to_string(),
            RoleKind::Decider => DECIDER_CONTRACT.to_string(),
        };
        format!(
            "{body}\n\n## Required Response Format\n\nYou may reason briefly first. End your reply with exactly one block:\n\n<output>\n{format}\n</output>",
            format = output_format(kind)
        )
    }
}

fn semantic_contract() -> String {
    format!(
        r#"You are the Semantic Reviewer. You review an answer given to a customer's question about a product. The answer is either the original answer or a revision written to improve it; the `target` field tells you which.

The closest matching intent of the question and the product category are provided with the question.

Judge ONLY whether the answer is semantically correct: it must explicitly address the question that was asked and be grammatically correct in the question's language. Do not judge whether the facts are right for the product; another reviewer does that.

Give a score from 0 to {max} and a brief justification. The justification must be written in English, whatever the language of the question."#,
        max = MAX_DIMENSION_SCORE
    )
}

fn contextual_contract() -> String {
    format!(
        r#"You are the Contextual Reviewer. You review an answer given to a customer's question about a product. The answer is either the original answer or a revision written to improve it; the `target` field tells you which.

`context` holds facts about the product, the store and related information. `metadata` holds rules for answering that must be respected. The product category is also provided.

Judge ONLY whether the answer is contextually correct: every statement must agree with the context or the metadata. Do not judge grammar or style; another reviewer does that.

An answer that says there is not enough information to answer is not contextually correct. An answer with missing or wrong information must not score 4 or higher.

Give a score from 0 to {max} and a brief justification. The justification must be written in English, whatever the language of the question."#,
        max = MAX_DIMENSION_SCORE
    )
}

const SUGGESTER_CONTRACT: &str = r#"You are the Suggester. An answer to a customer's question about a product was scored too low by the semantic and contextual reviewers. Their scores and justifications are provided.

Suggest concrete improvements that would fix the problems the reviewers found, using only what the context and metadata support. Do not write a revised answer; give suggestions only.

The suggestions must be written in English, even when the question and answer are in Portuguese or Spanish."#;

const REWRITER_CONTRACT: &str = r#"You are the Rewriter. Rewrite an answer to a customer's question about a product so that it addresses the improvement suggestions (or the decider's feedback on the previous rewrite).

`context` holds facts about the product, the store and related information. `category` is the product category. `intent` is the closest matching intent of the question. `metadata` holds rules for answering that must be respected.

Rules:
- Write the revised answer in the language given by `language`, which is the language of the question.
- If the answer contains a greeting or a signature, keep it, and include it only once.
- Use only information that can be explicitly inferred from the context or metadata and that makes sense for the question.
- If the context does not contain the information needed to answer, or the context or metadata state that this kind of question must not be answered, do not write an answer: reply with the cannot_rewrite status instead."#;

const DECIDER_CONTRACT: &str = r#"You are the Decider. An answer to a customer's question about a product was rewritten and both versions were scored by the semantic and contextual reviewers (each 0 to 5, aggregate 0 to 10). `previous` is the answer the rewrite started from and `revised` is the new candidate. `original_answer` is the answer as the customer originally received it.

Decide what to do:
- ANSWER_REVISED when the revised answer is good enough to send.
- ANSWER_ORIGINAL when the original answer is good enough and the revision is not an improvement.
- REWRITE when neither is good enough but the context holds what a better rewrite would need. REWRITE is not allowed once `revision_count` has reached `revision_cap`.
- DO_NOT_ANSWER when neither answer is good enough and a rewrite cannot fix it.

Never accept an answer that says there is no information to answer the question, or that the answer cannot be given. Never accept an answer that mentions another product unless that product appears in the context or metadata together with a link to it. In those cases decide DO_NOT_ANSWER (or REWRITE when a grounded answer is possible).

Give a brief justification in English."#;

fn output_format(kind: RoleKind) -> &'static str {
    match kind {
        RoleKind::SemanticReviewer | RoleKind::ContextualReviewer => {
            r#"{"score": <integer 0-5>, "justification": "<brief justification in English>"}"#
        }
        RoleKind::Suggester => r#"{"suggestions": "<improvement suggestions in English>"}"#,
        RoleKind::Rewriter => {
            r#"{"status": "revised", "revised_answer": "<the revised answer>"}
or, when the answer cannot be rewritten:
{"status": "cannot_rewrite", "reason": "<why, in English>"}"#
        }
        RoleKind::Decider => {
            r#"{"decision": "ANSWER_ORIGINAL" | "ANSWER_REVISED" | "REWRITE" | "DO_NOT_ANSWER", "justification": "<brief justification in English>"}"#
        }
    }
}
