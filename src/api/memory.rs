//! In-process backend holding the authoritative copy of every post.
//!
//! Behaves like the real service where the engine can observe it: keyset
//! cursors, toggle voting, authorship and role checks, and a report queue.
//! Tests can also script failures, hold requests in flight and count calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::{BackendApi, CreateTarget, PostPartial, PostRef, RemotePage, RemotePost, VoteAck};
use crate::error::BackendError;
use crate::model::{
    Actor, Author, BearerToken, MediaId, PostKind, PostStatus, Report, Role, Session, UserId,
    VoteDirection,
};
use crate::rules::DEFAULT_MAX_LENGTH;

/// Backend operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListRoots,
    ListReplies,
    CreatePost,
    EditPost,
    DeletePost,
    Vote,
    Report,
    ListReports,
    SetStatus,
    BanUser,
    CurrentUser,
}

#[derive(Debug, Clone)]
struct StoredPost {
    id: String,
    media: MediaId,
    /// `None` for root comments. Direct replies point at the root.
    parent: Option<String>,
    root: String,
    content: String,
    status: PostStatus,
    author: Author,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredPost {
    fn kind(&self) -> PostKind {
        if self.parent.is_none() {
            PostKind::Root
        } else {
            PostKind::Reply
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    posts: HashMap<String, StoredPost>,
    /// Post ids in creation order. Listing order and cursors follow it.
    order: Vec<String>,
    votes: HashMap<(String, UserId), i64>,
    reports: Vec<Report>,
    sessions: HashMap<String, Actor>,
    banned: HashSet<UserId>,
    failures: HashMap<Op, VecDeque<BackendError>>,
    next_report: u64,
}

impl Inner {
    fn score(&self, post_id: &str) -> i64 {
        self.votes
            .iter()
            .filter(|((id, _), _)| id == post_id)
            .map(|(_, value)| *value)
            .sum()
    }

    fn children(&self, parent: &str) -> Vec<&StoredPost> {
        self.order
            .iter()
            .filter_map(|id| self.posts.get(id))
            .filter(|p| p.parent.as_deref() == Some(parent))
            .collect()
    }

    fn to_remote(&self, post: &StoredPost, viewer: Option<&Actor>) -> RemotePost {
        // Anonymous readers get no vote field at all.
        let user_vote = viewer.map(|actor| {
            self.votes
                .get(&(post.id.clone(), actor.id.clone()))
                .copied()
                .unwrap_or(0)
        });
        RemotePost {
            id: post.id.clone(),
            content: post.content.clone(),
            score: self.score(&post.id),
            status: post.status,
            username: post.author.username.clone(),
            user_id: post.author.id.clone(),
            avatar_url: post.author.avatar_url.clone(),
            created_at: post.created_at,
            updated_at: Some(post.updated_at),
            user_vote,
            parent_id: post.parent.clone(),
            root_id: Some(post.root.clone()),
            replies_count: Some(self.children(&post.id).len() as u64),
        }
    }

    /// Resolve the caller. Anonymous is fine; an unknown token is not.
    fn viewer(&self, session: &Session) -> Result<Option<Actor>, BackendError> {
        match session.credential {
            None => Ok(None),
            Some(ref token) => self
                .sessions
                .get(token.expose())
                .cloned()
                .map(Some)
                .ok_or_else(|| BackendError::Unauthorized("Invalid or expired token".into())),
        }
    }

    fn actor(&self, session: &Session) -> Result<Actor, BackendError> {
        let actor = self
            .viewer(session)?
            .ok_or_else(|| BackendError::Unauthorized("Authentication required".into()))?;
        if self.banned.contains(&actor.id) {
            return Err(BackendError::Forbidden("User is banned".into()));
        }
        Ok(actor)
    }

    fn staff(&self, session: &Session) -> Result<Actor, BackendError> {
        let actor = self.actor(session)?;
        if !actor.role.is_staff() {
            return Err(BackendError::Forbidden("Moderator access required".into()));
        }
        Ok(actor)
    }

    fn post(&self, post: &PostRef) -> Result<&StoredPost, BackendError> {
        self.posts
            .get(&post.id)
            .filter(|p| p.kind() == post.kind)
            .ok_or_else(|| not_found(post.kind))
    }

    fn post_mut(&mut self, post: &PostRef) -> Result<&mut StoredPost, BackendError> {
        self.posts
            .get_mut(&post.id)
            .filter(|p| p.kind() == post.kind)
            .ok_or_else(|| not_found(post.kind))
    }

    fn insert(&mut self, post: StoredPost) -> String {
        let id = post.id.clone();
        self.order.push(id.clone());
        self.posts.insert(id.clone(), post);
        id
    }
}

fn not_found(kind: PostKind) -> BackendError {
    let what = match kind {
        PostKind::Root => "Comment",
        PostKind::Reply => "Reply",
    };
    BackendError::Status {
        status: 404,
        message: format!("{} not found", what),
    }
}

fn bad_request(message: impl Into<String>) -> BackendError {
    BackendError::Status {
        status: 400,
        message: message.into(),
    }
}

fn check_content(content: &str) -> Result<String, BackendError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(bad_request("Content is required"));
    }
    if trimmed.chars().count() > DEFAULT_MAX_LENGTH {
        return Err(bad_request("Content is too long"));
    }
    Ok(trimmed.to_string())
}

/// Keyset pagination over `items`: the cursor is the id of the last item
/// already returned.
fn paginate<'a>(
    items: Vec<&'a StoredPost>,
    limit: usize,
    cursor: Option<&str>,
) -> Result<(Vec<&'a StoredPost>, Option<String>), BackendError> {
    let start = match cursor {
        None => 0,
        Some(cursor) => items
            .iter()
            .position(|p| p.id == cursor)
            .map(|i| i + 1)
            .ok_or_else(|| bad_request("Invalid cursor"))?,
    };
    let limit = limit.max(1);
    let page: Vec<&'a StoredPost> = items.iter().skip(start).take(limit).copied().collect();
    let next_cursor = if start + page.len() < items.len() {
        page.last().map(|p| p.id.clone())
    } else {
        None
    };
    Ok((page, next_cursor))
}

#[derive(Debug)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    calls: watch::Sender<HashMap<Op, usize>>,
    paused: watch::Sender<HashSet<Op>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            calls: watch::channel(HashMap::new()).0,
            paused: watch::channel(HashSet::new()).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, wait while the operation is paused, then hand out a
    /// scripted failure if one is queued.
    async fn enter(&self, op: Op) -> Result<(), BackendError> {
        self.calls.send_modify(|calls| *calls.entry(op).or_default() += 1);

        let mut paused = self.paused.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = paused.wait_for(|paused| !paused.contains(&op)).await;

        let mut inner = self.lock();
        match inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => {
                tracing::debug!("Injected failure for {:?}: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Register a user and return a session carrying their token.
    pub fn register(&self, actor: Actor) -> Session {
        let token = format!("token-{}", Uuid::now_v7());
        self.lock().sessions.insert(token.clone(), actor.clone());
        Session::authenticated(BearerToken::new(token), actor)
    }

    /// Add a root comment as if another client had posted it.
    pub fn seed_root(&self, media: &MediaId, author: &Actor, content: &str) -> String {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        self.lock().insert(StoredPost {
            id: id.clone(),
            media: media.clone(),
            parent: None,
            root: id.clone(),
            content: content.to_string(),
            status: PostStatus::Active,
            author: author.as_author(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Add a reply under `parent`, which may be a root comment or a reply.
    /// Returns `None` if the parent does not exist.
    pub fn seed_reply(&self, parent: &str, author: &Actor, content: &str) -> Option<String> {
        let mut inner = self.lock();
        let (media, root) = inner
            .posts
            .get(parent)
            .map(|p| (p.media.clone(), p.root.clone()))?;
        let now = Utc::now();
        Some(inner.insert(StoredPost {
            id: Uuid::now_v7().to_string(),
            media,
            parent: Some(parent.to_string()),
            root,
            content: content.to_string(),
            status: PostStatus::Active,
            author: author.as_author(),
            created_at: now,
            updated_at: now,
        }))
    }

    pub fn seed_vote(&self, post_id: &str, user: &UserId, direction: VoteDirection) {
        self.lock()
            .votes
            .insert((post_id.to_string(), user.clone()), direction.value());
    }

    /// Make the next call of `op` fail with `err`. Failures queue up.
    pub fn fail_next(&self, op: Op, err: BackendError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Hold every call of `op` in flight until [`resume`](Self::resume).
    pub fn pause(&self, op: Op) {
        self.paused.send_modify(|paused| {
            paused.insert(op);
        });
    }

    pub fn resume(&self, op: Op) {
        self.paused.send_modify(|paused| {
            paused.remove(&op);
        });
    }

    /// Calls of `op` received so far, including paused and failed ones.
    pub fn calls(&self, op: Op) -> usize {
        self.calls.borrow().get(&op).copied().unwrap_or(0)
    }

    /// Wait until at least `n` calls of `op` have arrived.
    pub async fn wait_for_calls(&self, op: Op, n: usize) {
        let mut calls = self.calls.subscribe();
        let _ = calls
            .wait_for(|calls| calls.get(&op).copied().unwrap_or(0) >= n)
            .await;
    }

    pub fn score(&self, post_id: &str) -> i64 {
        self.lock().score(post_id)
    }

    pub fn status(&self, post_id: &str) -> Option<PostStatus> {
        self.lock().posts.get(post_id).map(|p| p.status)
    }

    pub fn content(&self, post_id: &str) -> Option<String> {
        self.lock().posts.get(post_id).map(|p| p.content.clone())
    }

    pub fn is_banned(&self, user: &UserId) -> bool {
        self.lock().banned.contains(user)
    }

    /// Reports still waiting in the queue.
    pub fn open_reports(&self) -> usize {
        self.lock().reports.len()
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }
}

#[async_trait]
impl BackendApi for MemoryBackend {
    async fn list_roots(
        &self,
        session: &Session,
        media: &MediaId,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError> {
        self.enter(Op::ListRoots).await?;
        let inner = self.lock();
        let viewer = inner.viewer(session)?;
        let roots: Vec<&StoredPost> = inner
            .order
            .iter()
            .filter_map(|id| inner.posts.get(id))
            .filter(|p| p.parent.is_none() && p.media == *media)
            .collect();
        let total = roots.len() as u64;
        let (page, next_cursor) = paginate(roots, limit, cursor)?;
        Ok(RemotePage {
            posts: page
                .into_iter()
                .map(|p| inner.to_remote(p, viewer.as_ref()))
                .collect(),
            total: Some(total),
            next_cursor,
        })
    }

    async fn list_replies(
        &self,
        session: &Session,
        root: &str,
        parent: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError> {
        self.enter(Op::ListReplies).await?;
        let inner = self.lock();
        let viewer = inner.viewer(session)?;
        inner.post(&PostRef::root(root))?;
        let owner = match parent {
            Some(parent) => {
                let parent_post = inner.post(&PostRef::reply(parent))?;
                if parent_post.root != root {
                    return Err(bad_request("Parent does not belong to this thread"));
                }
                parent
            }
            None => root,
        };
        let children = inner.children(owner);
        let total = children.len() as u64;
        let (page, next_cursor) = paginate(children, limit, cursor)?;
        Ok(RemotePage {
            posts: page
                .into_iter()
                .map(|p| inner.to_remote(p, viewer.as_ref()))
                .collect(),
            total: Some(total),
            next_cursor,
        })
    }

    async fn create_post(
        &self,
        session: &Session,
        target: &CreateTarget,
        content: &str,
    ) -> Result<RemotePost, BackendError> {
        self.enter(Op::CreatePost).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        let content = check_content(content)?;

        let (media, parent, root) = match target {
            CreateTarget::Media(media) => (media.clone(), None, None),
            CreateTarget::Reply { root, parent } => {
                let root_post = inner.post(&PostRef::root(root.as_str()))?;
                let media = root_post.media.clone();
                let parent = match parent {
                    Some(parent) => {
                        let parent_post = inner.post(&PostRef::reply(parent.as_str()))?;
                        if parent_post.root != *root {
                            return Err(bad_request("Parent does not belong to this thread"));
                        }
                        parent.clone()
                    }
                    None => root.clone(),
                };
                (media, Some(parent), Some(root.clone()))
            }
        };

        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let post = StoredPost {
            root: root.unwrap_or_else(|| id.clone()),
            id,
            media,
            parent,
            content,
            status: PostStatus::Active,
            author: actor.as_author(),
            created_at: now,
            updated_at: now,
        };
        let remote = inner.to_remote(&post, Some(&actor));
        inner.insert(post);
        Ok(remote)
    }

    async fn edit_post(
        &self,
        session: &Session,
        post: &PostRef,
        content: &str,
    ) -> Result<RemotePost, BackendError> {
        self.enter(Op::EditPost).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        let content = check_content(content)?;

        let stored = inner.post_mut(post)?;
        if !actor.is_author_of(&stored.author) {
            return Err(BackendError::Forbidden("You can only edit your own posts".into()));
        }
        if stored.status.is_terminal() {
            return Err(bad_request("Post is no longer editable"));
        }
        stored.content = content;
        stored.updated_at = Utc::now();
        let stored = stored.clone();
        Ok(inner.to_remote(&stored, Some(&actor)))
    }

    async fn delete_post(&self, session: &Session, post: &PostRef) -> Result<(), BackendError> {
        self.enter(Op::DeletePost).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        let stored = inner.post_mut(post)?;
        if !actor.is_author_of(&stored.author) {
            return Err(BackendError::Forbidden("You can only delete your own posts".into()));
        }
        if stored.status.is_terminal() {
            return Err(bad_request("Post is already gone"));
        }
        stored.status = PostStatus::Deleted;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn vote(
        &self,
        session: &Session,
        post: &PostRef,
        vote: VoteDirection,
    ) -> Result<VoteAck, BackendError> {
        self.enter(Op::Vote).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        inner.post(post)?;

        let key = (post.id.clone(), actor.id.clone());
        if inner.votes.get(&key) == Some(&vote.value()) {
            inner.votes.remove(&key);
        } else {
            inner.votes.insert(key, vote.value());
        }
        Ok(VoteAck {
            post_id: post.id.clone(),
            score: inner.score(&post.id),
        })
    }

    async fn report(
        &self,
        session: &Session,
        post: &PostRef,
        reason: &str,
    ) -> Result<(), BackendError> {
        self.enter(Op::Report).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        if reason.trim().is_empty() {
            return Err(bad_request("Reason is required"));
        }
        let stored = inner.post(post)?.clone();

        inner.next_report += 1;
        let id = format!("report-{}", inner.next_report);
        inner.reports.push(Report {
            id,
            post_id: stored.id,
            post_content: stored.content,
            post_author: stored.author.username,
            author_id: stored.author.id,
            reporter: actor.username,
            reason: reason.trim().to_string(),
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn list_reports(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Report>, BackendError> {
        self.enter(Op::ListReports).await?;
        let inner = self.lock();
        inner.staff(session)?;
        Ok(inner
            .reports
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        session: &Session,
        post_id: &str,
        status: PostStatus,
    ) -> Result<PostPartial, BackendError> {
        self.enter(Op::SetStatus).await?;
        let mut inner = self.lock();
        inner.staff(session)?;
        if status == PostStatus::Deleted {
            return Err(bad_request("Invalid status"));
        }

        let stored = inner
            .posts
            .get_mut(post_id)
            .ok_or_else(|| not_found(PostKind::Root))?;
        stored.status = status;
        stored.updated_at = Utc::now();
        let partial = PostPartial {
            id: Some(stored.id.clone()),
            status: Some(stored.status),
            content: Some(stored.content.clone()),
            score: None,
            updated_at: Some(stored.updated_at),
        };
        inner.reports.retain(|r| r.post_id != post_id);
        Ok(PostPartial {
            score: Some(inner.score(post_id)),
            ..partial
        })
    }

    async fn ban_user(&self, session: &Session, user: &UserId) -> Result<(), BackendError> {
        self.enter(Op::BanUser).await?;
        let mut inner = self.lock();
        let actor = inner.actor(session)?;
        if actor.role != Role::Admin {
            return Err(BackendError::Forbidden("Admin access required".into()));
        }
        inner.banned.insert(user.clone());
        Ok(())
    }

    async fn current_user(&self, credential: &BearerToken) -> Result<Actor, BackendError> {
        self.enter(Op::CurrentUser).await?;
        self.lock()
            .sessions
            .get(credential.expose())
            .cloned()
            .ok_or_else(|| BackendError::Unauthorized("Invalid or expired token".into()))
    }
}
