//! Error types for the approval workflow core.

/// Errors surfaced by registries, the transition resolver and the
/// application state machine.
///
/// Reference-data lookups always fail loudly rather than returning a null
/// value, so a bad action or stage-type code can never silently misroute an
/// application.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// Action code or enum not present in the registry. Caller input error.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Stage-type code or enum not present in the registry.
    #[error("unknown stage type: {0}")]
    UnknownStageType(String),

    /// Transition enum, field or stage-id target that cannot be resolved.
    #[error("unknown transition: {0}")]
    UnknownTransition(String),

    /// Action not permitted in the application's current stage or state.
    #[error("action {action} is not available in stage '{stage}'")]
    IllegalAction { action: &'static str, stage: String },

    /// Malformed workflow configuration (e.g. duplicate ordinal numbers).
    /// Fatal at configuration time, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Concurrent modification detected; the caller should reload the
    /// application and may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invariant violation in model state. Programming error, logged and
    /// surfaced, never swallowed.
    #[error("{0}")]
    Model(String),

    /// Misuse of an internal API (e.g. an unregistered feature key).
    #[error("{0}")]
    Coding(String),

    /// Failure in the persistence collaborator.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type ApprovalResult<T> = Result<T, ApprovalError>;
