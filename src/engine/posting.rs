use chrono::Utc;

use crate::api::{BackendApi, CreateTarget};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{MediaId, Post, PostId, PostPatch, PostStatus, Session, Vote};
use crate::rules::{check_transition, validate_content, WriteAction};
use crate::sync::Scope;

use super::{post_ref, require_actor, server_patch, CommentEngine, Outcome};

/// How a create ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Created {
    /// The placeholder now lives under the server id.
    Confirmed(PostId),
    /// The placeholder was cancelled before the server answered.
    Cancelled,
}

impl Created {
    pub fn id(&self) -> Option<&PostId> {
        match self {
            Created::Confirmed(id) => Some(id),
            Created::Cancelled => None,
        }
    }
}

fn placeholder(
    id: PostId,
    parent_id: Option<PostId>,
    root_id: PostId,
    content: &str,
    session: &Session,
) -> EngineResult<Post> {
    let author = require_actor(session)?.as_author();
    let now = Utc::now();
    Ok(Post {
        id,
        parent_id,
        root_id,
        content: content.to_string(),
        score: 0,
        user_vote: Vote::None,
        status: PostStatus::Active,
        author,
        created_at: now,
        updated_at: now,
        reply_count: 0,
        pending: true,
    })
}

impl<A: BackendApi> CommentEngine<A> {
    /// Post a root comment on `media`. The placeholder is listed at the end
    /// of the media's root scope until the server answers.
    pub async fn post_comment(
        &self,
        session: &Session,
        media: &MediaId,
        content: &str,
    ) -> EngineResult<Created> {
        require_actor(session)?;
        let content = validate_content(content, self.config.max_length)?;
        let scope = Scope::roots(media.clone());

        let temp = {
            let mut state = self.state();
            state.admit(WriteAction::CreateComment)?;
            let temp = self.temp_id();
            let post = placeholder(temp.clone(), None, temp.clone(), &content, session)?;
            state.store.upsert(post)?;
            state.cursors.push_local(&scope, temp.clone());
            temp
        };
        tracing::debug!("Optimistic comment {} on {}", temp, media);

        let result = self
            .api
            .create_post(session, &CreateTarget::Media(media.clone()), &content)
            .await;

        let mut state = self.state();
        if !state.store.contains(&temp) {
            tracing::debug!("Dropping create response for cancelled {}", temp);
            return Ok(Created::Cancelled);
        }
        match result {
            Ok(remote) => {
                let server = remote.into_server_copy(None, None);
                let id = server.post.id.clone();
                state.store.confirm(&temp, server)?;
                state.cursors.replace(&temp, &id);
                tracing::info!("Comment {} confirmed as {}", temp, id);
                Ok(Created::Confirmed(id))
            }
            Err(err) => {
                state.discard_pending(&temp)?;
                tracing::warn!("Comment {} failed, rolled back: {}", temp, err);
                Err(err.into())
            }
        }
    }

    /// Reply to `parent`, which may be a root comment or another reply.
    ///
    /// Once confirmed the parent's reply scope is reloaded from the start.
    /// A failed reload is logged and does not fail the reply.
    pub async fn post_reply(
        &self,
        session: &Session,
        parent: &PostId,
        content: &str,
    ) -> EngineResult<Created> {
        require_actor(session)?;
        let content = validate_content(content, self.config.max_length)?;

        let (temp, scope, target, root_id) = {
            let mut state = self.state();
            let parent_post = state.find(parent)?;
            let parent_ref = post_ref(parent_post)?;
            let root_id = parent_post.root_id.clone();
            let root = root_id
                .server_id()
                .ok_or_else(|| ValidationError::PendingPost(root_id.clone()))?
                .to_string();
            let scope = Scope::replies_of(parent_post);
            let target = CreateTarget::Reply {
                parent: (!parent_post.is_root()).then_some(parent_ref.id),
                root,
            };

            state.admit(WriteAction::CreateReply)?;
            let temp = self.temp_id();
            let post = placeholder(
                temp.clone(),
                Some(parent.clone()),
                root_id.clone(),
                &content,
                session,
            )?;
            state.store.upsert(post)?;
            state.cursors.push_local(&scope, temp.clone());
            state.shift_reply_count(parent, 1);
            (temp, scope, target, root_id)
        };
        tracing::debug!("Optimistic reply {} under {}", temp, parent);

        let result = self.api.create_post(session, &target, &content).await;

        let id = {
            let mut state = self.state();
            if !state.store.contains(&temp) {
                tracing::debug!("Dropping create response for cancelled {}", temp);
                return Ok(Created::Cancelled);
            }
            match result {
                Ok(remote) => {
                    let server = remote.into_server_copy(Some(parent.clone()), Some(root_id));
                    let id = server.post.id.clone();
                    state.store.confirm(&temp, server)?;
                    state.cursors.replace(&temp, &id);
                    tracing::info!("Reply {} confirmed as {}", temp, id);
                    id
                }
                Err(err) => {
                    state.discard_pending(&temp)?;
                    tracing::warn!("Reply {} failed, rolled back: {}", temp, err);
                    return Err(err.into());
                }
            }
        };

        if let Err(err) = self.refresh_scope(session, &scope).await {
            tracing::warn!("Refresh of {} after reply failed: {}", scope, err);
        }
        Ok(Created::Confirmed(id))
    }

    /// Replace the content of the caller's own post.
    pub async fn edit(&self, session: &Session, id: &PostId, content: &str) -> EngineResult<Outcome> {
        let actor = require_actor(session)?;
        let content = validate_content(content, self.config.max_length)?;

        {
            let mut state = self.state();
            let post = state.find(id)?;
            post_ref(post)?;
            if !actor.is_author_of(&post.author) {
                return Err(EngineError::forbidden("You can only edit your own posts"));
            }
            state.admit(WriteAction::Edit)?;
        }

        let _lane = self.post_lanes.acquire(id).await;

        let (snapshot, generation, target) = {
            let mut state = self.state();
            let snapshot = state.find(id)?.clone();
            let target = post_ref(&snapshot)?;
            let generation = state.store.patch(
                id,
                &PostPatch {
                    content: Some(content.clone()),
                    updated_at: Some(Utc::now()),
                    pending: Some(true),
                    ..Default::default()
                },
            )?;
            (snapshot, generation, target)
        };
        tracing::debug!("Optimistic edit of {}", id);

        let result = self.api.edit_post(session, &target, &content).await;

        let mut state = self.state();
        if !state.is_current(id, generation) {
            tracing::debug!("Dropping stale edit response for {}", id);
            return Ok(Outcome::Superseded);
        }
        match result {
            Ok(remote) => {
                state.store.patch(id, &server_patch(remote))?;
                tracing::info!("Edit of {} confirmed", id);
                Ok(Outcome::Applied)
            }
            Err(err) => {
                state.store.restore(snapshot)?;
                tracing::warn!("Edit of {} failed, rolled back: {}", id, err);
                Err(err.into())
            }
        }
    }

    /// Delete the caller's own post.
    ///
    /// A post that is still pending is cancelled locally instead: it leaves
    /// the store and any late create response is dropped.
    pub async fn delete(&self, session: &Session, id: &PostId) -> EngineResult<Outcome> {
        let actor = require_actor(session)?;

        {
            let mut state = self.state();
            let post = state.find(id)?;
            if id.is_pending() {
                if !actor.is_author_of(&post.author) {
                    return Err(EngineError::forbidden("You can only delete your own posts"));
                }
                state.discard_pending(id)?;
                tracing::info!("Cancelled pending post {}", id);
                return Ok(Outcome::Applied);
            }
            check_transition(actor, &post.author, post.status, PostStatus::Deleted)?;
            state.admit(WriteAction::Delete)?;
        }

        let _lane = self.post_lanes.acquire(id).await;

        let (snapshot, generation, target) = {
            let mut state = self.state();
            let snapshot = state.find(id)?.clone();
            check_transition(actor, &snapshot.author, snapshot.status, PostStatus::Deleted)?;
            let target = post_ref(&snapshot)?;
            let generation = state.store.patch(
                id,
                &PostPatch {
                    status: Some(PostStatus::Deleted),
                    pending: Some(true),
                    ..Default::default()
                },
            )?;
            (snapshot, generation, target)
        };
        tracing::debug!("Optimistic delete of {}", id);

        let result = self.api.delete_post(session, &target).await;

        let mut state = self.state();
        if !state.is_current(id, generation) {
            tracing::debug!("Dropping stale delete response for {}", id);
            return Ok(Outcome::Superseded);
        }
        match result {
            Ok(()) => {
                state.store.patch(
                    id,
                    &PostPatch {
                        updated_at: Some(Utc::now()),
                        pending: Some(false),
                        ..Default::default()
                    },
                )?;
                tracing::info!("Delete of {} confirmed", id);
                Ok(Outcome::Applied)
            }
            Err(err) => {
                state.store.restore(snapshot)?;
                tracing::warn!("Delete of {} failed, rolled back: {}", id, err);
                Err(err.into())
            }
        }
    }
}
