//! Error kinds for the queue's user-visible API.
//!
//! `ExecutionFailure` is the one variant that is not a user error: it is how
//! a job-level outcome (non-zero exit, timeout, spawn failure) travels from
//! the `Executor` to the `Worker`, which maps it onto a `Store::finalize_*`
//! call rather than ever returning it to a caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QctlError {
    #[error("duplicate job id '{0}'")]
    DuplicateId(String),

    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("unknown config key '{0}'")]
    UnknownConfig(String),

    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{0}' is not in the dead state")]
    NotDead(String),

    #[error("a supervisor is already running (pid {0})")]
    AlreadyRunning(i64),

    #[error("store error: {0}")]
    StoreError(#[source] anyhow::Error),

    #[error("execution failure: {0}")]
    ExecutionFailure(String),
}

/// Maps an error to the process-level exit code the CLI needs, independent
/// of the `Display` message.
pub trait Categorizable {
    /// Exit code per the CLI's contract: 0 success, 1 operational failure, 2 usage error.
    fn exit_code(&self) -> i32;
}

impl Categorizable for QctlError {
    fn exit_code(&self) -> i32 {
        match self {
            QctlError::InvalidSpec(_) => 2,
            QctlError::DuplicateId(_)
            | QctlError::UnknownConfig(_)
            | QctlError::NotFound(_)
            | QctlError::NotDead(_)
            | QctlError::AlreadyRunning(_)
            | QctlError::StoreError(_)
            | QctlError::ExecutionFailure(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, QctlError>;
