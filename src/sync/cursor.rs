use std::collections::HashMap;
use std::fmt;

use crate::model::{MediaId, Post, PostId};

/// A pagination context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Root comments of a media item.
    Roots(MediaId),
    /// Direct replies under `parent`, or under `root` itself when `parent`
    /// is `None`.
    Replies {
        root: PostId,
        parent: Option<PostId>,
    },
}

impl Scope {
    pub fn roots(media: MediaId) -> Self {
        Self::Roots(media)
    }

    /// The scope listing the direct children of `post`.
    pub fn replies_of(post: &Post) -> Self {
        if post.is_root() {
            Self::Replies {
                root: post.id.clone(),
                parent: None,
            }
        } else {
            Self::Replies {
                root: post.root_id.clone(),
                parent: Some(post.id.clone()),
            }
        }
    }

    /// The post whose children this scope lists.
    pub fn owner(&self) -> Option<&PostId> {
        match self {
            Self::Roots(_) => None,
            Self::Replies {
                parent: Some(parent),
                ..
            } => Some(parent),
            Self::Replies { root, parent: None } => Some(root),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roots(media) => write!(f, "roots({})", media),
            Self::Replies { root, parent: None } => write!(f, "replies({})", root),
            Self::Replies {
                root,
                parent: Some(parent),
            } => write!(f, "replies({}/{})", root, parent),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeState {
    /// Token for the next page. `None` before the first load.
    pub cursor: Option<String>,
    pub exhausted: bool,
    /// At least one page has been applied.
    pub loaded: bool,
    /// Materialized child ids in server order, followed by local inserts.
    pub items: Vec<PostId>,
    /// Count reported by the server with the last page.
    pub total: Option<u64>,
}

/// What the next fetch for a scope should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Nothing left to load.
    Exhausted,
    /// Fetch from `cursor`. `reset` means start over and replace the list.
    Fetch { cursor: Option<String>, reset: bool },
}

/// Per-scope cursors, exhaustion flags and materialized child lists.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    scopes: HashMap<Scope, ScopeState>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: &Scope) -> Option<&ScopeState> {
        self.scopes.get(scope)
    }

    pub fn items(&self, scope: &Scope) -> &[PostId] {
        self.scopes
            .get(scope)
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_loaded(&self, scope: &Scope) -> bool {
        self.scopes.get(scope).map(|s| s.loaded).unwrap_or(false)
    }

    pub fn is_exhausted(&self, scope: &Scope) -> bool {
        self.scopes.get(scope).map(|s| s.exhausted).unwrap_or(false)
    }

    pub(crate) fn next_request(&self, scope: &Scope, force: bool) -> PageRequest {
        if force {
            return PageRequest::Fetch {
                cursor: None,
                reset: true,
            };
        }
        match self.scopes.get(scope) {
            Some(state) if state.exhausted => PageRequest::Exhausted,
            Some(state) if state.loaded => PageRequest::Fetch {
                cursor: state.cursor.clone(),
                reset: false,
            },
            // Never fetched: local inserts may be present, but the list
            // still starts from the server's first page.
            _ => PageRequest::Fetch {
                cursor: None,
                reset: true,
            },
        }
    }

    /// Apply a fetched page and return the ids that were newly added to
    /// the list.
    ///
    /// Without `reset` the ids are appended in server order, skipping ones
    /// already listed. With `reset` the list is rebuilt from this page and
    /// the ids for which `keep_local` holds are carried over at the end.
    pub(crate) fn apply_page(
        &mut self,
        scope: &Scope,
        ids: Vec<PostId>,
        next_cursor: Option<String>,
        total: Option<u64>,
        reset: bool,
        keep_local: impl Fn(&PostId) -> bool,
    ) -> Vec<PostId> {
        let state = self.scopes.entry(scope.clone()).or_default();

        let mut added = Vec::with_capacity(ids.len());
        if reset {
            let carried: Vec<PostId> = state
                .items
                .iter()
                .filter(|id| keep_local(id) && !ids.contains(id))
                .cloned()
                .collect();
            state.items.clear();
            for id in ids {
                if !state.items.contains(&id) {
                    state.items.push(id.clone());
                    added.push(id);
                }
            }
            state.items.extend(carried);
        } else {
            for id in ids {
                if !state.items.contains(&id) {
                    state.items.push(id.clone());
                    added.push(id);
                }
            }
        }

        state.exhausted = next_cursor.is_none();
        state.cursor = next_cursor;
        state.loaded = true;
        if total.is_some() {
            state.total = total;
        }
        added
    }

    /// Append a locally created post to a scope.
    pub(crate) fn push_local(&mut self, scope: &Scope, id: PostId) {
        let state = self.scopes.entry(scope.clone()).or_default();
        if !state.items.contains(&id) {
            state.items.push(id);
        }
    }

    /// Swap a placeholder id for its server id in every scope.
    pub(crate) fn replace(&mut self, old: &PostId, new: &PostId) {
        for state in self.scopes.values_mut() {
            let Some(pos) = state.items.iter().position(|id| id == old) else {
                continue;
            };
            if state.items.contains(new) {
                state.items.remove(pos);
            } else {
                state.items[pos] = new.clone();
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &PostId) {
        for state in self.scopes.values_mut() {
            state.items.retain(|item| item != id);
        }
        // A removed placeholder never had scopes of its own worth keeping.
        self.scopes.retain(|scope, _| scope.owner() != Some(id));
    }
}
