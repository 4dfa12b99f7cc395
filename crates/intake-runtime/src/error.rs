//! Error types for background workflow jobs.

use thiserror::Error;

use crate::llm::GenerationError;

/// Failure of a single job or workflow step.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] intake_core::Error),

    #[error("Text generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A precondition that callers must guarantee did not hold. Never retried.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl JobError {
    /// True for errors that point at a caller bug rather than a transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// True when the underlying cause is a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(intake_core::Error::NotFound(_)))
    }
}

pub type JobResult<T> = std::result::Result<T, JobError>;
