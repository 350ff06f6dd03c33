use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_WINDOW_MS: u64 = 2000;

/// A user write that the submission gate may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteAction {
    CreateComment,
    CreateReply,
    Edit,
    Delete,
    Vote,
    Report,
}

impl WriteAction {
    pub const ALL: [WriteAction; 6] = [
        WriteAction::CreateComment,
        WriteAction::CreateReply,
        WriteAction::Edit,
        WriteAction::Delete,
        WriteAction::Vote,
        WriteAction::Report,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateComment => "create-comment",
            Self::CreateReply => "create-reply",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Vote => "vote",
            Self::Report => "report",
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named coverage presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateCoverage {
    AllWrites,
    #[default]
    CreatesOnly,
}

impl GateCoverage {
    pub fn actions(self) -> BTreeSet<WriteAction> {
        match self {
            Self::AllWrites => WriteAction::ALL.into_iter().collect(),
            Self::CreatesOnly => [WriteAction::CreateComment, WriteAction::CreateReply]
                .into_iter()
                .collect(),
        }
    }
}

/// Which actions the gate covers and for how long it stays armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    pub window: Duration,
    pub covered: BTreeSet<WriteAction>,
}

impl GatePolicy {
    pub fn new(coverage: GateCoverage, window: Duration) -> Self {
        Self {
            window,
            covered: coverage.actions(),
        }
    }

    pub fn with_actions(window: Duration, actions: impl IntoIterator<Item = WriteAction>) -> Self {
        Self {
            window,
            covered: actions.into_iter().collect(),
        }
    }

    pub fn covers(&self, action: WriteAction) -> bool {
        self.covered.contains(&action)
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::new(
            GateCoverage::default(),
            Duration::from_millis(DEFAULT_WINDOW_MS),
        )
    }
}

/// Session-wide write cooldown. One timer, not per post.
#[derive(Debug)]
pub struct SubmissionGate {
    policy: GatePolicy,
    armed_until: Option<Instant>,
}

impl SubmissionGate {
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
            armed_until: None,
        }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Time left before covered actions are accepted again.
    pub fn remaining(&self) -> Option<Duration> {
        let until = self.armed_until?;
        let now = Instant::now();
        if now < until {
            Some(until - now)
        } else {
            None
        }
    }

    pub fn is_armed(&self) -> bool {
        self.remaining().is_some()
    }

    /// Admit `action` or report how long it must wait. Admitting a covered
    /// action re-arms the timer. Uncovered actions always pass and never arm.
    pub fn admit(&mut self, action: WriteAction) -> Result<(), Duration> {
        if !self.policy.covers(action) {
            return Ok(());
        }

        if let Some(left) = self.remaining() {
            tracing::debug!("Gate rejected {} ({:?} left)", action, left);
            return Err(left);
        }

        self.armed_until = Some(Instant::now() + self.policy.window);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(coverage: GateCoverage) -> SubmissionGate {
        SubmissionGate::new(GatePolicy::new(coverage, Duration::from_millis(2000)))
    }

    #[tokio::test(start_paused = true)]
    async fn second_create_within_window_is_rejected() {
        let mut gate = gate(GateCoverage::CreatesOnly);
        assert!(gate.admit(WriteAction::CreateComment).is_ok());

        let left = gate.admit(WriteAction::CreateReply).unwrap_err();
        assert_eq!(left, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn window_elapses() {
        let mut gate = gate(GateCoverage::CreatesOnly);
        gate.admit(WriteAction::CreateComment).unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(
            gate.admit(WriteAction::CreateComment),
            Err(Duration::from_millis(500))
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!gate.is_armed());
        assert!(gate.admit(WriteAction::CreateComment).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn creates_only_lets_votes_through() {
        let mut gate = gate(GateCoverage::CreatesOnly);
        gate.admit(WriteAction::CreateComment).unwrap();

        for _ in 0..5 {
            assert!(gate.admit(WriteAction::Vote).is_ok());
        }
        assert!(gate.admit(WriteAction::Edit).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn uncovered_actions_do_not_arm() {
        let mut gate = gate(GateCoverage::CreatesOnly);
        gate.admit(WriteAction::Vote).unwrap();
        assert!(!gate.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn all_writes_gates_votes() {
        let mut gate = gate(GateCoverage::AllWrites);
        gate.admit(WriteAction::Vote).unwrap();
        assert!(gate.admit(WriteAction::Vote).is_err());
        assert!(gate.admit(WriteAction::CreateComment).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_action_set() {
        let policy = GatePolicy::with_actions(
            Duration::from_millis(100),
            [WriteAction::CreateComment, WriteAction::Vote],
        );
        let mut gate = SubmissionGate::new(policy);
        gate.admit(WriteAction::Vote).unwrap();
        assert!(gate.admit(WriteAction::CreateComment).is_err());
        assert!(gate.admit(WriteAction::CreateReply).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_never_blocks() {
        let mut gate = SubmissionGate::new(GatePolicy::new(GateCoverage::AllWrites, Duration::ZERO));
        assert!(gate.admit(WriteAction::CreateComment).is_ok());
        assert!(gate.admit(WriteAction::CreateComment).is_ok());
    }

    #[test]
    fn coverage_deserializes_kebab_case() {
        let c: GateCoverage = serde_json::from_str("\"all-writes\"").unwrap();
        assert_eq!(c, GateCoverage::AllWrites);
        let a: WriteAction = serde_json::from_str("\"create-reply\"").unwrap();
        assert_eq!(a, WriteAction::CreateReply);
    }
}
