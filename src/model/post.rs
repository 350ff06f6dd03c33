use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PostId, UserId};

/// The caller's own vote on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vote {
    Down,
    #[default]
    None,
    Up,
}

impl Vote {
    pub fn value(self) -> i64 {
        match self {
            Self::Down => -1,
            Self::None => 0,
            Self::Up => 1,
        }
    }

    /// Interpret a server-provided vote value. Anything outside {-1, 0, 1}
    /// (or a missing value) reads as no vote.
    pub fn from_value(value: Option<i64>) -> Self {
        match value {
            Some(1) => Self::Up,
            Some(-1) => Self::Down,
            _ => Self::None,
        }
    }
}

/// A requested vote. Only up or down can be requested; clearing happens by
/// repeating the current direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn value(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    pub fn as_vote(self) -> Vote {
        match self {
            Self::Up => Vote::Up,
            Self::Down => Vote::Down,
        }
    }
}

impl TryFrom<i64> for VoteDirection {
    type Error = crate::error::ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(crate::error::ValidationError::InvalidVote(other)),
        }
    }
}

/// Visibility status of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Active,
    Hidden,
    Removed,
    Deleted,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Hidden => "hidden",
            Self::Removed => "removed",
            Self::Deleted => "deleted",
        }
    }

    /// Removed and deleted posts never come back through this engine.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed | Self::Deleted)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "hidden" => Ok(Self::Hidden),
            "removed" => Ok(Self::Removed),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Whether a post sits at the top of a thread or under another post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostKind {
    Root,
    Reply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<UserId>,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A root comment or a reply. Both share this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub parent_id: Option<PostId>,
    /// Top-level ancestor. Set once when the post enters the store.
    pub root_id: PostId,
    pub content: String,
    pub score: i64,
    pub user_vote: Vote,
    pub status: PostStatus,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of direct replies as last reported by the server, plus local
    /// optimistic inserts.
    pub reply_count: u64,
    /// True while a create, edit or delete is unconfirmed.
    pub pending: bool,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn kind(&self) -> PostKind {
        if self.is_root() {
            PostKind::Root
        } else {
            PostKind::Reply
        }
    }
}

/// A post as the server reported it. `user_vote` and `reply_count` are
/// `None` when the response left them out, and merging keeps the local
/// values in that case.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCopy {
    pub post: Post,
    pub user_vote: Option<Vote>,
    pub reply_count: Option<u64>,
}

impl From<Post> for ServerCopy {
    fn from(post: Post) -> Self {
        Self {
            user_vote: Some(post.user_vote),
            reply_count: Some(post.reply_count),
            post,
        }
    }
}

/// Partial local mutation applied through the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub content: Option<String>,
    pub score: Option<i64>,
    pub user_vote: Option<Vote>,
    pub status: Option<PostStatus>,
    pub updated_at: Option<DateTime<Utc>>,
    pub reply_count: Option<u64>,
    pub pending: Option<bool>,
}

impl PostPatch {
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(ref content) = self.content {
            post.content = content.clone();
        }
        if let Some(score) = self.score {
            post.score = score;
        }
        if let Some(vote) = self.user_vote {
            post.user_vote = vote;
        }
        if let Some(status) = self.status {
            post.status = status;
        }
        if let Some(updated_at) = self.updated_at {
            post.updated_at = updated_at;
        }
        if let Some(count) = self.reply_count {
            post.reply_count = count;
        }
        if let Some(pending) = self.pending {
            post.pending = pending;
        }
    }
}
