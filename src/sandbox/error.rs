// ABOUTME: Error values returned by the sandbox stores and orchestrator.
// ABOUTME: Usage errors (unknown ids, bad transitions, duplicates) plus storage failures.

use thiserror::Error;

use super::queue::QueueStatus;

/// Errors surfaced to callers of the allowlist, queue, auditor, and sandbox.
///
/// Policy blocks and queued commands are not errors; they are reported through
/// `ExecutionResult`.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: QueueStatus,
        to: QueueStatus,
    },

    #[error("queue entry {0} is already being run")]
    AlreadyRunning(String),

    #[error("pattern already in allowlist: {0}")]
    DuplicatePattern(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export failed: {0}")]
    Export(String),
}

impl SandboxError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
