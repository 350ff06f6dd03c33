// Status transitions - validated before anything is applied
use crate::error::{EngineError, ValidationError};
use crate::model::{Actor, Author, PostStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{0}")]
    Forbidden(String),

    #[error("Cannot change status from {from} to {to}")]
    Invalid { from: PostStatus, to: PostStatus },
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Forbidden(msg) => EngineError::Authorization(msg),
            TransitionError::Invalid { from, to } => {
                EngineError::Validation(ValidationError::InvalidTransition { from, to })
            }
        }
    }
}

/// Check that `actor` may move a post written by `author` from `from` to `to`.
///
/// | from            | to      | who                  |
/// |-----------------|---------|----------------------|
/// | active          | hidden  | moderator, admin     |
/// | hidden          | active  | moderator, admin     |
/// | active, hidden  | removed | moderator, admin     |
/// | active          | deleted | the post's author    |
///
/// Nothing leaves `removed` or `deleted`.
pub fn check_transition(
    actor: &Actor,
    author: &Author,
    from: PostStatus,
    to: PostStatus,
) -> Result<(), TransitionError> {
    use PostStatus::*;

    if from.is_terminal() {
        return Err(TransitionError::Invalid { from, to });
    }

    match (from, to) {
        (Active, Hidden) | (Hidden, Active) | (Active, Removed) | (Hidden, Removed) => {
            require_role(actor, Role::Moderator)
        }
        (Active, Deleted) => {
            if actor.is_author_of(author) {
                Ok(())
            } else {
                Err(TransitionError::Forbidden(
                    "Only the author can delete this post".to_string(),
                ))
            }
        }
        _ => Err(TransitionError::Invalid { from, to }),
    }
}

pub fn require_role(actor: &Actor, required: Role) -> Result<(), TransitionError> {
    if actor.role >= required {
        Ok(())
    } else {
        Err(TransitionError::Forbidden(format!(
            "Requires {:?} role",
            required
        )))
    }
}
