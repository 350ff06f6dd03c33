//! Optimistic comment engine.
//!
//! All shared state sits behind one std mutex that is never held across an
//! await. Network calls happen with the lock released; mutations on the same
//! post queue on a per-post lane so snapshot and rollback stay deterministic.
//!
//! Every optimistic change records the generation it produced. When the
//! response comes back the generation is compared again: a mismatch means the
//! entity moved on locally and the response is dropped without rollback.

mod moderation;
mod paging;
mod posting;
mod voting;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::api::{BackendApi, PostRef, RemotePost};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{Actor, BearerToken, MediaId, Post, PostId, PostPatch, Report, Session, Vote};
use crate::rules::{GatePolicy, SubmissionGate, WriteAction, DEFAULT_MAX_LENGTH};
use crate::sync::{CursorRegistry, EntityStore, Lanes, Scope, ScopeState};
use crate::view::{build_thread, ThreadNode, Visibility};

pub use self::paging::PageLoad;
pub use self::posting::Created;

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum post length in characters.
    pub max_length: usize,
    pub page_size: usize,
    pub gate: GatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            page_size: DEFAULT_PAGE_SIZE,
            gate: GatePolicy::default(),
        }
    }
}

/// How a mutation ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server confirmed and its answer was merged.
    Applied,
    /// The post changed locally while the request was in flight, so the
    /// response was dropped.
    Superseded,
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) store: EntityStore,
    pub(crate) cursors: CursorRegistry,
    pub(crate) gate: SubmissionGate,
    pub(crate) reports: Vec<Report>,
}

pub struct CommentEngine<A> {
    api: Arc<A>,
    state: Mutex<EngineState>,
    post_lanes: Lanes<PostId>,
    scope_lanes: Lanes<Scope>,
    next_temp: AtomicU64,
    config: EngineConfig,
}

impl<A: BackendApi> CommentEngine<A> {
    pub fn new(api: Arc<A>, config: EngineConfig) -> Self {
        Self {
            api,
            state: Mutex::new(EngineState {
                store: EntityStore::new(),
                cursors: CursorRegistry::new(),
                gate: SubmissionGate::new(config.gate.clone()),
                reports: Vec::new(),
            }),
            post_lanes: Lanes::new(),
            scope_lanes: Lanes::new(),
            next_temp: AtomicU64::new(1),
            config,
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a bearer token into a session.
    pub async fn sign_in(&self, credential: BearerToken) -> EngineResult<Session> {
        let actor = self.api.current_user(&credential).await?;
        tracing::info!("Signed in as {} ({:?})", actor.username, actor.role);
        Ok(Session::authenticated(credential, actor))
    }

    /// Current local copy of a post, including unconfirmed changes.
    pub fn post(&self, id: &PostId) -> Option<Post> {
        self.state().store.get(id).cloned()
    }

    pub fn generation(&self, id: &PostId) -> Option<u64> {
        self.state().store.generation(id)
    }

    pub fn scope_items(&self, scope: &Scope) -> Vec<PostId> {
        self.state().cursors.items(scope).to_vec()
    }

    pub fn scope_state(&self, scope: &Scope) -> Option<ScopeState> {
        self.state().cursors.get(scope).cloned()
    }

    /// Time left on the write cooldown.
    pub fn cooldown(&self) -> Option<Duration> {
        self.state().gate.remaining()
    }

    /// Build a fresh nested view of the threads for `media`.
    pub fn thread_view(&self, media: &MediaId, visibility: Visibility) -> Vec<ThreadNode> {
        let state = self.state();
        build_thread(&state.store, &state.cursors, media, visibility)
    }

    fn temp_id(&self) -> PostId {
        PostId::Pending(self.next_temp.fetch_add(1, Ordering::Relaxed))
    }
}

impl EngineState {
    fn admit(&mut self, action: WriteAction) -> EngineResult<()> {
        self.gate
            .admit(action)
            .map_err(|retry_after| EngineError::Throttled {
                action,
                retry_after,
            })
    }

    fn find(&self, id: &PostId) -> EngineResult<&Post> {
        self.store
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    /// Change a reply count by `delta`, if the post is still around.
    fn shift_reply_count(&mut self, id: &PostId, delta: i64) {
        if let Some(post) = self.store.get(id) {
            let count = post.reply_count.saturating_add_signed(delta);
            let _ = self.store.set_reply_count(id, count);
        }
    }

    /// Drop an unconfirmed post together with its list entries.
    fn discard_pending(&mut self, id: &PostId) -> EngineResult<Post> {
        let post = self.store.remove(id)?;
        self.cursors.remove(id);
        if let Some(ref parent) = post.parent_id {
            self.shift_reply_count(parent, -1);
        }
        Ok(post)
    }

    /// True when the entity still carries the generation our change produced.
    fn is_current(&self, id: &PostId, generation: u64) -> bool {
        self.store.generation(id) == Some(generation)
    }
}

fn require_actor(session: &Session) -> EngineResult<&Actor> {
    session
        .actor
        .as_ref()
        .ok_or_else(EngineError::unauthenticated)
}

/// Wire address of a confirmed post.
fn post_ref(post: &Post) -> EngineResult<PostRef> {
    let id = post
        .id
        .server_id()
        .ok_or_else(|| ValidationError::PendingPost(post.id.clone()))?;
    Ok(PostRef {
        id: id.to_string(),
        kind: post.kind(),
    })
}

/// Fields of a server copy that overwrite local estimates. Caller vote and
/// reply count only when the server sent them.
fn server_patch(remote: RemotePost) -> PostPatch {
    PostPatch {
        content: Some(remote.content),
        score: Some(remote.score),
        user_vote: remote.user_vote.map(|v| Vote::from_value(Some(v))),
        status: Some(remote.status),
        updated_at: Some(remote.updated_at.unwrap_or(remote.created_at)),
        reply_count: remote.replies_count,
        pending: Some(false),
    }
}
