use crate::api::BackendApi;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{PostId, Session};
use crate::sync::{PageRequest, Scope};

use super::CommentEngine;

/// Result of one page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoad {
    /// Ids that were newly added to the scope, in server order.
    pub added: Vec<PostId>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Next,
    /// First page only, and only if nothing is loaded yet.
    Open,
    Restart,
}

fn server_id(id: &PostId) -> EngineResult<&str> {
    id.server_id()
        .ok_or_else(|| EngineError::from(ValidationError::PendingPost(id.clone())))
}

impl<A: BackendApi> CommentEngine<A> {
    /// Load the next page of `scope`. An exhausted scope resolves at once
    /// with nothing added.
    pub async fn load_page(&self, session: &Session, scope: &Scope) -> EngineResult<PageLoad> {
        self.fetch_page(session, scope, Fetch::Next).await
    }

    /// Expand a scope. Cached items are returned without a request once the
    /// scope has been loaded; otherwise the first page is fetched.
    pub async fn open_scope(&self, session: &Session, scope: &Scope) -> EngineResult<Vec<PostId>> {
        if !self.state().cursors.is_loaded(scope) {
            self.fetch_page(session, scope, Fetch::Open).await?;
        }
        Ok(self.scope_items(scope))
    }

    /// Reload a scope from its first page. Pending local posts in the scope
    /// stay listed after the server's items.
    pub async fn refresh_scope(&self, session: &Session, scope: &Scope) -> EngineResult<PageLoad> {
        self.fetch_page(session, scope, Fetch::Restart).await
    }

    async fn fetch_page(
        &self,
        session: &Session,
        scope: &Scope,
        fetch: Fetch,
    ) -> EngineResult<PageLoad> {
        let _lane = self.scope_lanes.acquire(scope).await;

        let request = {
            let state = self.state();
            if let Some(owner) = scope.owner() {
                state.find(owner)?;
            }
            // Another expand may have loaded the scope while we waited.
            if fetch == Fetch::Open && state.cursors.is_loaded(scope) {
                return Ok(PageLoad {
                    added: Vec::new(),
                    exhausted: state.cursors.is_exhausted(scope),
                });
            }
            state.cursors.next_request(scope, fetch == Fetch::Restart)
        };
        let (cursor, reset) = match request {
            PageRequest::Exhausted => {
                tracing::debug!("{} is exhausted", scope);
                return Ok(PageLoad {
                    added: Vec::new(),
                    exhausted: true,
                });
            }
            PageRequest::Fetch { cursor, reset } => (cursor, reset),
        };

        let limit = self.config.page_size;
        let page = match scope {
            Scope::Roots(media) => {
                self.api
                    .list_roots(session, media, limit, cursor.as_deref())
                    .await?
            }
            Scope::Replies { root, parent } => {
                let parent = parent.as_ref().map(server_id).transpose()?;
                self.api
                    .list_replies(session, server_id(root)?, parent, limit, cursor.as_deref())
                    .await?
            }
        };

        let (parent_id, root_id) = match scope {
            Scope::Roots(_) => (None, None),
            Scope::Replies { root, parent } => (
                Some(parent.clone().unwrap_or_else(|| root.clone())),
                Some(root.clone()),
            ),
        };

        let mut state = self.state();
        let mut ids = Vec::with_capacity(page.posts.len());
        for remote in page.posts {
            let copy = remote.into_server_copy(parent_id.clone(), root_id.clone());
            let id = copy.post.id.clone();
            // A post with a mutation in flight keeps its optimistic state.
            if !(state.store.contains(&id) && self.post_lanes.is_busy(&id)) {
                state.store.upsert(copy)?;
            }
            ids.push(id);
        }

        // Only placeholders are local inserts. A confirmed post with an edit
        // in flight keeps its server slot.
        let added = state.cursors.apply_page(
            scope,
            ids,
            page.next_cursor,
            page.total,
            reset,
            PostId::is_pending,
        );

        if let (Some(owner), Some(total)) = (scope.owner(), page.total) {
            let local = state
                .cursors
                .items(scope)
                .iter()
                .filter(|id| id.is_pending())
                .count() as u64;
            state.store.set_reply_count(owner, total + local)?;
        }

        let exhausted = state.cursors.is_exhausted(scope);
        tracing::info!(
            "Loaded {} new posts into {} (exhausted: {})",
            added.len(),
            scope,
            exhausted
        );
        Ok(PageLoad { added, exhausted })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::{MemoryBackend, Op};
    use crate::engine::{CommentEngine, EngineConfig};
    use crate::model::{Actor, MediaId, Role, Session};
    use crate::sync::Scope;

    fn engine(page_size: usize) -> (Arc<MemoryBackend>, CommentEngine<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let config = EngineConfig {
            page_size,
            ..EngineConfig::default()
        };
        (backend.clone(), CommentEngine::new(backend, config))
    }

    #[tokio::test]
    async fn exhausted_scope_is_a_no_op() {
        let (backend, engine) = engine(10);
        let media = MediaId::new("m1");
        backend.seed_root(&media, &Actor::new("u1", "kana", Role::User), "only one");

        let scope = Scope::roots(media);
        let first = engine.load_page(&Session::anonymous(), &scope).await.unwrap();
        assert_eq!(first.added.len(), 1);
        assert!(first.exhausted);

        let again = engine.load_page(&Session::anonymous(), &scope).await.unwrap();
        assert!(again.added.is_empty());
        assert!(again.exhausted);
        assert_eq!(backend.calls(Op::ListRoots), 1);
    }

    #[tokio::test]
    async fn reopening_uses_cached_pages() {
        let (backend, engine) = engine(2);
        let media = MediaId::new("m1");
        let author = Actor::new("u1", "kana", Role::User);
        for i in 0..3 {
            backend.seed_root(&media, &author, &format!("c{}", i));
        }

        let scope = Scope::roots(media);
        let opened = engine.open_scope(&Session::anonymous(), &scope).await.unwrap();
        assert_eq!(opened.len(), 2);

        let reopened = engine.open_scope(&Session::anonymous(), &scope).await.unwrap();
        assert_eq!(reopened, opened);
        assert_eq!(backend.calls(Op::ListRoots), 1);
    }

    #[tokio::test]
    async fn reply_scope_needs_its_owner_loaded() {
        let (backend, engine) = engine(10);
        let scope = Scope::Replies {
            root: crate::model::PostId::confirmed("missing"),
            parent: None,
        };
        let err = engine
            .load_page(&Session::anonymous(), &scope)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(backend.calls(Op::ListReplies), 0);
    }
}
