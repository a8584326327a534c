//! # revisor-roles
//!
//! Typed contracts for the five revision roles.
//!
//! Each role has a declared input view ([`SemanticInput`], [`RewriterInput`],
//! ...), a system contract ([`RolePrompts`]) and a typed reply
//! ([`Judgment`], [`Suggestion`], [`Rewrite`], [`Verdict`]). The
//! [`RoleInvoker`] sends the prompt to an [`revisor_agent::Agent`], parses the
//! trailing `<output>` block and retries malformed replies and backend
//! failures within a [`RetryPolicy`].

mod inputs;
pub mod invoker;
mod output;
mod prompts;

pub use inputs::{
    ContextualInput, DeciderInput, EvaluationTarget, Language, RewriterInput, RoleInput, RoleKind,
    ScoredAnswer, SemanticInput, SuggesterInput,
};
pub use invoker::{FailureKind, RetryCallback, RetryNotice, RetryPolicy, RoleError, RoleInvoker};
pub use output::{
    collapse_repeats, parse_output, Decision, Judgment, OutputError, Rewrite, RoleOutput,
    Suggestion, Verdict, DEFAULT_DECLINE_REASON, MAX_AGGREGATE_SCORE, MAX_DIMENSION_SCORE,
};
pub use prompts::RolePrompts;
