// Vote arithmetic. Pure: no store access, no I/O.
use crate::model::{Vote, VoteDirection};

/// Local estimate after a vote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub score: i64,
    pub user_vote: Vote,
}

/// Compute the new score and vote state for `requested` on a post that
/// currently has `score` and the caller's `current` vote.
///
/// Requesting the vote already held clears it. The score moves by
/// `new - current`, so a flip from down to up is +2 and clearing an up
/// vote is -1.
pub fn apply_vote(score: i64, current: Vote, requested: VoteDirection) -> VoteOutcome {
    let target = requested.as_vote();
    let user_vote = if current == target { Vote::None } else { target };

    VoteOutcome {
        score: score + (user_vote.value() - current.value()),
        user_vote,
    }
}
