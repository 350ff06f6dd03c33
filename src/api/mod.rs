// Backend API - the remote source of truth, reached through the pass-through proxy
mod http;
mod memory;
mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::model::{
    Actor, Author, BearerToken, MediaId, Post, PostId, PostKind, PostStatus, Report, ServerCopy,
    Session, UserId, Vote, VoteDirection,
};

pub use self::http::{HttpBackend, DEFAULT_TIMEOUT};
pub use self::memory::{MemoryBackend, Op};

/// A post as the server describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePost {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub status: PostStatus,
    pub username: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_vote: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub root_id: Option<String>,
    #[serde(default, alias = "reply_count")]
    pub replies_count: Option<u64>,
}

impl RemotePost {
    /// Build a store entity. Structure always comes from the caller, which
    /// knows which scope or parent the post was fetched through.
    pub fn into_post(self, parent_id: Option<PostId>, root_id: Option<PostId>) -> Post {
        let id = PostId::Confirmed(self.id);
        let root_id = match parent_id {
            None => id.clone(),
            Some(_) => root_id.unwrap_or_else(|| id.clone()),
        };
        Post {
            root_id,
            parent_id,
            content: self.content,
            score: self.score,
            user_vote: Vote::from_value(self.user_vote),
            status: self.status,
            author: Author {
                id: self.user_id,
                username: self.username,
                avatar_url: self.avatar_url,
            },
            updated_at: self.updated_at.unwrap_or(self.created_at),
            created_at: self.created_at,
            reply_count: self.replies_count.unwrap_or(0),
            pending: false,
            id,
        }
    }

    /// Like [`into_post`](Self::into_post), remembering which optional
    /// fields the server actually sent.
    pub fn into_server_copy(self, parent_id: Option<PostId>, root_id: Option<PostId>) -> ServerCopy {
        let user_vote = self.user_vote.map(|v| Vote::from_value(Some(v)));
        let reply_count = self.replies_count;
        ServerCopy {
            post: self.into_post(parent_id, root_id),
            user_vote,
            reply_count,
        }
    }
}

/// One page of a scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemotePage {
    pub posts: Vec<RemotePost>,
    /// Root comment total or reply count, when the server reports one.
    pub total: Option<u64>,
    pub next_cursor: Option<String>,
}

/// Fields returned by a moderation status change. Any may be missing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostPartial {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAck {
    pub post_id: String,
    pub score: i64,
}

/// A confirmed post addressed on the wire. `kind` picks the endpoint family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub id: String,
    pub kind: PostKind,
}

impl PostRef {
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PostKind::Root,
        }
    }

    pub fn reply(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PostKind::Reply,
        }
    }
}

/// Where a new post goes: exactly one of a media item or a parent post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTarget {
    Media(MediaId),
    /// A reply in the thread of `root`. `parent` is `None` for a direct
    /// reply to the root comment.
    Reply {
        root: String,
        parent: Option<String>,
    },
}

/// Remote operations consumed by the engine. Every call carries the
/// caller's session explicitly.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_roots(
        &self,
        session: &Session,
        media: &MediaId,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError>;

    async fn list_replies(
        &self,
        session: &Session,
        root: &str,
        parent: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError>;

    async fn create_post(
        &self,
        session: &Session,
        target: &CreateTarget,
        content: &str,
    ) -> Result<RemotePost, BackendError>;

    async fn edit_post(
        &self,
        session: &Session,
        post: &PostRef,
        content: &str,
    ) -> Result<RemotePost, BackendError>;

    async fn delete_post(&self, session: &Session, post: &PostRef) -> Result<(), BackendError>;

    /// The server toggles: repeating the caller's current direction clears it.
    async fn vote(
        &self,
        session: &Session,
        post: &PostRef,
        vote: VoteDirection,
    ) -> Result<VoteAck, BackendError>;

    async fn report(
        &self,
        session: &Session,
        post: &PostRef,
        reason: &str,
    ) -> Result<(), BackendError>;

    async fn list_reports(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Report>, BackendError>;

    async fn set_status(
        &self,
        session: &Session,
        post_id: &str,
        status: PostStatus,
    ) -> Result<PostPartial, BackendError>;

    async fn ban_user(&self, session: &Session, user: &UserId) -> Result<(), BackendError>;

    async fn current_user(&self, credential: &BearerToken) -> Result<Actor, BackendError>;
}
