use std::time::Duration;

use revisor_roles::{RoleError, RoleKind};
use thiserror::Error;

/// Fatal errors that abort a revision request. A request that ends in
/// DO_NOT_ANSWER is not an error.
#[derive(Error, Debug)]
pub enum RevisionError {
    #[error(transparent)]
    Role(#[from] RoleError),

    #[error("Revision did not terminate within {max_steps} role steps")]
    CycleLimitExceeded { max_steps: usize },

    #[error("Revision timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("State violation in {role}: {detail}")]
    StateViolation { role: RoleKind, detail: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RevisionError {
    pub(crate) fn violation(role: RoleKind, detail: impl Into<String>) -> Self {
        Self::StateViolation {
            role,
            detail: detail.into(),
        }
    }

    /// Whether the failure came from the generation backend rather than
    /// from the revision protocol itself
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Role(RoleError::GenerationUnavailable { .. } | RoleError::MalformedOutput { .. })
        )
    }
}
