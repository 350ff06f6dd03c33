// Pure domain rules: vote arithmetic, write cooldown, status transitions, content checks.
mod content;
mod gate;
mod transitions;
mod vote;

pub use self::content::{validate_content, validate_reason, DEFAULT_MAX_LENGTH};
pub use self::gate::{GateCoverage, GatePolicy, SubmissionGate, WriteAction, DEFAULT_WINDOW_MS};
pub use self::transitions::{check_transition, require_role, TransitionError};
pub use self::vote::{apply_vote, VoteOutcome};
