use thiserror::Error;

use crate::flows::FlowTransitionError;

/// Violations of negotiation invariants. Out-of-band proposals and blocked
/// drafts are NOT errors; they travel the ordinary return path as escalation
/// outcomes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("collaborator failure: {0}")]
    Collaborator(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("unknown negotiation thread: {0}")]
    UnknownThread(String),
}
