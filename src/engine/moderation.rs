use chrono::Utc;

use crate::api::BackendApi;
use crate::error::{EngineResult, ValidationError};
use crate::model::{PostId, PostPatch, PostStatus, Report, Role, Session, UserId};
use crate::rules::{check_transition, require_role, validate_reason, WriteAction};

use super::{post_ref, require_actor, CommentEngine, EngineState, Outcome};

impl EngineState {
    fn merge_reports(&mut self, reports: Vec<Report>, replace: bool) {
        if replace {
            self.reports.clear();
        }
        for report in reports {
            if !self.reports.iter().any(|r| r.id == report.id) {
                self.reports.push(report);
            }
        }
    }

    fn drop_reports_for(&mut self, post_id: &str) {
        self.reports.retain(|r| r.post_id != post_id);
    }
}

impl<A: BackendApi> CommentEngine<A> {
    /// Flag a post for moderators. Nothing changes locally.
    pub async fn report(&self, session: &Session, id: &PostId, reason: &str) -> EngineResult<()> {
        require_actor(session)?;
        let reason = validate_reason(reason)?;

        let target = {
            let mut state = self.state();
            let target = post_ref(state.find(id)?)?;
            state.admit(WriteAction::Report)?;
            target
        };

        self.api.report(session, &target, &reason).await?;
        tracing::info!("Reported {}", id);
        Ok(())
    }

    /// Local copy of the moderation queue.
    pub fn reports(&self) -> Vec<Report> {
        self.state().reports.clone()
    }

    /// Queue entries whose reported content or author contains `needle`.
    pub fn search_reports(&self, needle: &str) -> Vec<Report> {
        self.state()
            .reports
            .iter()
            .filter(|r| r.matches(needle))
            .cloned()
            .collect()
    }

    /// Fetch a slice of the moderation queue. Offset 0 replaces the local
    /// queue; later offsets append. Returns the whole local queue.
    pub async fn load_reports(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> EngineResult<Vec<Report>> {
        let actor = require_actor(session)?;
        require_role(actor, Role::Moderator)?;

        let reports = self.api.list_reports(session, limit, offset).await?;
        tracing::info!("Loaded {} reports at offset {}", reports.len(), offset);

        let mut state = self.state();
        state.merge_reports(reports, offset == 0);
        Ok(state.reports.clone())
    }

    /// Set a post's moderation status.
    ///
    /// When the post is in the store the transition is checked against its
    /// current status and applied optimistically. Posts known only from the
    /// report queue are forwarded after a role check. On success every
    /// queued report for the post is dropped.
    pub async fn set_status(
        &self,
        session: &Session,
        id: &PostId,
        status: PostStatus,
    ) -> EngineResult<Outcome> {
        let actor = require_actor(session)?;
        require_role(actor, Role::Moderator)?;
        let server_id = id
            .server_id()
            .ok_or_else(|| ValidationError::PendingPost(id.clone()))?
            .to_string();

        let known = {
            let state = self.state();
            match state.store.get(id) {
                Some(post) => {
                    if status == PostStatus::Deleted {
                        return Err(ValidationError::InvalidTransition {
                            from: post.status,
                            to: status,
                        }
                        .into());
                    }
                    check_transition(actor, &post.author, post.status, status)?;
                    true
                }
                None => false,
            }
        };

        if !known {
            if status == PostStatus::Deleted {
                return Err(ValidationError::InvalidTransition {
                    from: PostStatus::Active,
                    to: status,
                }
                .into());
            }
            self.api.set_status(session, &server_id, status).await?;
            self.state().drop_reports_for(&server_id);
            tracing::info!("Status of {} set to {}", id, status);
            return Ok(Outcome::Applied);
        }

        let _lane = self.post_lanes.acquire(id).await;

        let (snapshot, generation) = {
            let mut state = self.state();
            let snapshot = state.find(id)?.clone();
            check_transition(actor, &snapshot.author, snapshot.status, status)?;
            let generation = state.store.patch(
                id,
                &PostPatch {
                    status: Some(status),
                    ..Default::default()
                },
            )?;
            (snapshot, generation)
        };
        tracing::debug!("Optimistic status {} -> {} on {}", snapshot.status, status, id);

        let result = self.api.set_status(session, &server_id, status).await;

        let mut state = self.state();
        let current = state.is_current(id, generation);
        match result {
            Ok(partial) => {
                state.drop_reports_for(&server_id);
                if !current {
                    tracing::debug!("Dropping stale status response for {}", id);
                    return Ok(Outcome::Superseded);
                }
                state.store.patch(
                    id,
                    &PostPatch {
                        content: partial.content,
                        score: partial.score,
                        status: Some(partial.status.unwrap_or(status)),
                        updated_at: Some(partial.updated_at.unwrap_or_else(Utc::now)),
                        ..Default::default()
                    },
                )?;
                tracing::info!("Status of {} set to {}", id, status);
                Ok(Outcome::Applied)
            }
            Err(err) => {
                if !current {
                    tracing::debug!("Dropping stale status failure for {}", id);
                    return Ok(Outcome::Superseded);
                }
                state.store.restore(snapshot)?;
                tracing::warn!("Status change on {} failed, rolled back: {}", id, err);
                Err(err.into())
            }
        }
    }

    /// Ban a user. Admins only.
    pub async fn ban_user(&self, session: &Session, user: &UserId) -> EngineResult<()> {
        let actor = require_actor(session)?;
        require_role(actor, Role::Admin)?;
        self.api.ban_user(session, user).await?;
        tracing::info!("Banned user {}", user);
        Ok(())
    }
}
