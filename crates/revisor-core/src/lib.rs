//! # revisor-core
//!
//! The answer-revision state machine.
//!
//! A [`RevisionRequest`] seeds a fresh [`RevisionState`]. The
//! [`Orchestrator`] starts at the semantic reviewer and follows the
//! [`Routing`] each [`Role`] returns until one of them terminates with a
//! [`FinalAnswer`]. The [`ResultExtractor`] then applies the score rules and
//! builds the caller's [`RevisionResponse`] and the results-log row.

mod error;
mod extract;
mod orchestrator;
mod request;
pub mod role;
mod state;

pub use error::RevisionError;
pub use extract::{ResultExtractor, RevisionResponse, RevisionResult};
pub use orchestrator::{Orchestrator, RevisionSettings};
pub use request::{Intent, RevisionRequest};
pub use role::Role;
pub use state::{
    Assessment, Dimension, FinalAnswer, RevisionState, Routing, StateDelta, StepRecord,
};
