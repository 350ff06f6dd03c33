use crate::api::BackendApi;
use crate::error::EngineResult;
use crate::model::{PostId, PostPatch, Session, VoteDirection};
use crate::rules::{apply_vote, WriteAction};

use super::{post_ref, require_actor, CommentEngine, Outcome};

impl<A: BackendApi> CommentEngine<A> {
    /// Vote on a post. Repeating the current direction clears the vote.
    ///
    /// Votes on the same post run one at a time: a second vote waits until
    /// the first is confirmed or rolled back, then applies on top of the
    /// result.
    pub async fn vote(
        &self,
        session: &Session,
        id: &PostId,
        direction: VoteDirection,
    ) -> EngineResult<Outcome> {
        require_actor(session)?;

        {
            let mut state = self.state();
            post_ref(state.find(id)?)?;
            state.admit(WriteAction::Vote)?;
        }

        let _lane = self.post_lanes.acquire(id).await;

        let (snapshot, generation, target) = {
            let mut state = self.state();
            let snapshot = state.find(id)?.clone();
            let target = post_ref(&snapshot)?;
            let estimate = apply_vote(snapshot.score, snapshot.user_vote, direction);
            let generation = state.store.patch(
                id,
                &PostPatch {
                    score: Some(estimate.score),
                    user_vote: Some(estimate.user_vote),
                    ..Default::default()
                },
            )?;
            tracing::debug!(
                "Optimistic vote on {}: score {} -> {}",
                id,
                snapshot.score,
                estimate.score
            );
            (snapshot, generation, target)
        };

        let result = self.api.vote(session, &target, direction).await;

        let mut state = self.state();
        if !state.is_current(id, generation) {
            tracing::debug!("Dropping stale vote response for {}", id);
            return Ok(Outcome::Superseded);
        }
        match result {
            Ok(ack) => {
                // The server's tally replaces the estimate. The caller's own
                // vote is already known locally.
                state.store.patch(
                    id,
                    &PostPatch {
                        score: Some(ack.score),
                        ..Default::default()
                    },
                )?;
                tracing::info!("Vote on {} confirmed, score {}", id, ack.score);
                Ok(Outcome::Applied)
            }
            Err(err) => {
                state.store.restore(snapshot)?;
                tracing::warn!("Vote on {} failed, rolled back: {}", id, err);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::{MemoryBackend, Op};
    use crate::engine::{CommentEngine, EngineConfig, Outcome};
    use crate::error::{BackendError, ErrorKind};
    use crate::model::{
        Actor, MediaId, PostId, PostPatch, Role, Session, UserId, Vote, VoteDirection,
    };
    use crate::sync::Scope;

    type Fixture = (Arc<MemoryBackend>, CommentEngine<MemoryBackend>, Session, PostId);

    /// One root comment by someone else, up-voted by `voters`, already loaded.
    async fn loaded(voters: &[&str]) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let media = MediaId::new("m1");
        let id = backend.seed_root(&media, &Actor::new("u9", "mio", Role::User), "hello");
        for user in voters {
            backend.seed_vote(&id, &UserId::new(*user), VoteDirection::Up);
        }
        let session = backend.register(Actor::new("u1", "kana", Role::User));
        let engine = CommentEngine::new(backend.clone(), EngineConfig::default());
        engine
            .open_scope(&session, &Scope::roots(media))
            .await
            .unwrap();
        (backend, engine, session, PostId::confirmed(id))
    }

    #[tokio::test]
    async fn server_score_replaces_estimate() {
        let (backend, engine, session, id) = loaded(&["a", "b"]).await;
        // Someone else voted after our page was loaded.
        backend.seed_vote(id.server_id().unwrap(), &UserId::new("c"), VoteDirection::Up);

        let outcome = engine.vote(&session, &id, VoteDirection::Up).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        let post = engine.post(&id).unwrap();
        assert_eq!(post.score, 4);
        assert_eq!(post.user_vote, Vote::Up);
    }

    #[tokio::test]
    async fn unauthorized_vote_rolls_back() {
        let (backend, engine, session, id) = loaded(&["a"]).await;
        backend.fail_next(Op::Vote, BackendError::Unauthorized("expired".into()));

        let before = engine.post(&id).unwrap();
        let err = engine
            .vote(&session, &id, VoteDirection::Down)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        let after = engine.post(&id).unwrap();
        assert_eq!(after.score, before.score);
        assert_eq!(after.user_vote, before.user_vote);
    }

    #[tokio::test]
    async fn stale_failure_is_dropped_without_rollback() {
        let (backend, engine, session, id) = loaded(&["a"]).await;
        let engine = Arc::new(engine);
        backend.pause(Op::Vote);

        let task = {
            let engine = engine.clone();
            let session = session.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.vote(&session, &id, VoteDirection::Up).await })
        };
        backend.wait_for_calls(Op::Vote, 1).await;

        // A newer local change lands while the vote is in flight.
        engine
            .state()
            .store
            .patch(
                &id,
                &PostPatch {
                    content: Some("newer".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        backend.fail_next(Op::Vote, BackendError::Transport("connection reset".into()));
        backend.resume(Op::Vote);

        assert_eq!(task.await.unwrap().unwrap(), Outcome::Superseded);
        let post = engine.post(&id).unwrap();
        assert_eq!(post.content, "newer");
        assert_eq!(post.score, 2);
        assert_eq!(post.user_vote, Vote::Up);
    }

    #[tokio::test]
    async fn stale_confirmation_does_not_overwrite() {
        let (backend, engine, session, id) = loaded(&[]).await;
        let engine = Arc::new(engine);
        backend.pause(Op::Vote);

        let task = {
            let engine = engine.clone();
            let session = session.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.vote(&session, &id, VoteDirection::Down).await })
        };
        backend.wait_for_calls(Op::Vote, 1).await;
        engine
            .state()
            .store
            .patch(
                &id,
                &PostPatch {
                    score: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        backend.resume(Op::Vote);

        assert_eq!(task.await.unwrap().unwrap(), Outcome::Superseded);
        assert_eq!(engine.post(&id).unwrap().score, 10);
        assert_eq!(backend.score(id.server_id().unwrap()), -1);
    }

    #[tokio::test]
    async fn votes_on_pending_posts_are_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let session = backend.register(Actor::new("u1", "kana", Role::User));
        let engine = Arc::new(CommentEngine::new(backend.clone(), EngineConfig::default()));
        backend.pause(Op::CreatePost);

        let create = {
            let engine = engine.clone();
            let session = session.clone();
            tokio::spawn(async move {
                engine
                    .post_comment(&session, &MediaId::new("m1"), "hello")
                    .await
            })
        };
        backend.wait_for_calls(Op::CreatePost, 1).await;

        let err = engine
            .vote(&session, &PostId::Pending(1), VoteDirection::Up)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.calls(Op::Vote), 0);

        backend.resume(Op::CreatePost);
        create.await.unwrap().unwrap();
    }
}
