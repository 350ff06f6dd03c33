use std::time::Duration;

use crate::model::{PostId, PostStatus};
use crate::rules::WriteAction;

/// Input rejected before any network call. Local state is untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Content cannot be empty")]
    EmptyContent,

    #[error("Content cannot exceed {max} characters (got {len})")]
    ContentTooLong { max: usize, len: usize },

    #[error("Invalid vote value: {0}")]
    InvalidVote(i64),

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: PostStatus, to: PostStatus },

    #[error("Report reason cannot be empty")]
    EmptyReason,

    #[error("Post {0} is not confirmed yet")]
    PendingPost(PostId),

    #[error("Invalid thread structure: {0}")]
    Structure(String),
}

/// Failure reported by a backend implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Error returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Throttled: {action} blocked for another {retry_after:?}")]
    Throttled {
        action: WriteAction,
        retry_after: Duration,
    },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Post not found: {0}")]
    NotFound(PostId),

    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(msg) | BackendError::Forbidden(msg) => {
                EngineError::Authorization(msg)
            }
            other => EngineError::Backend(other),
        }
    }
}

/// Coarse classification used by callers to decide what to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Throttled,
    Authorization,
    NotFound,
    Failed,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Throttled { .. } => ErrorKind::Throttled,
            EngineError::Authorization(_) => ErrorKind::Authorization,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Backend(_) => ErrorKind::Failed,
        }
    }

    /// Whether retrying the same action later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Throttled | ErrorKind::Failed)
    }

    pub(crate) fn unauthenticated() -> Self {
        EngineError::Authorization("Sign in required".to_string())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        EngineError::Authorization(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
