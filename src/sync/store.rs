use std::collections::HashMap;

use crate::error::{EngineError, ValidationError};
use crate::model::{Post, PostId, PostPatch, ServerCopy};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Post not found: {0}")]
    NotFound(PostId),

    #[error("Post {0} is confirmed and cannot be removed")]
    NotPending(PostId),

    #[error("Parent {parent} of post {id} is not in the store")]
    Orphan { id: PostId, parent: PostId },

    #[error("Post {id} claims root {found} but its parent belongs to {expected}")]
    RootMismatch {
        id: PostId,
        expected: PostId,
        found: PostId,
    },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Validation(ValidationError::Structure(other.to_string())),
        }
    }
}

#[derive(Debug)]
struct Entry {
    post: Post,
    generation: u64,
}

/// Flat id-keyed map of every known post plus a parent -> children index.
///
/// Every mutation stamps the entry with a fresh generation from a single
/// store-wide counter, so a generation is never reused even if an id is
/// removed and inserted again.
#[derive(Debug, Default)]
pub struct EntityStore {
    entries: HashMap<PostId, Entry>,
    children: HashMap<PostId, Vec<PostId>>,
    next_generation: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &PostId) -> Option<&Post> {
        self.entries.get(id).map(|e| &e.post)
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn generation(&self, id: &PostId) -> Option<u64> {
        self.entries.get(id).map(|e| e.generation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locally known direct children, in the order they entered the store.
    #[cfg(test)]
    pub(crate) fn children_of(&self, id: &PostId) -> &[PostId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Follow parent pointers up to the root.
    #[cfg(test)]
    pub(crate) fn ancestors(&self, id: &PostId) -> Vec<PostId> {
        let mut chain = Vec::new();
        let mut cursor = self.get(id).and_then(|p| p.parent_id.clone());
        while let Some(parent) = cursor {
            cursor = self.get(&parent).and_then(|p| p.parent_id.clone());
            chain.push(parent);
        }
        chain
    }

    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Enforce the root invariant for a post entering the store.
    fn check_structure(&self, post: &Post) -> Result<(), StoreError> {
        match post.parent_id {
            None => {
                if post.root_id != post.id {
                    return Err(StoreError::RootMismatch {
                        id: post.id.clone(),
                        expected: post.id.clone(),
                        found: post.root_id.clone(),
                    });
                }
            }
            Some(ref parent_id) => {
                let parent = self.get(parent_id).ok_or_else(|| StoreError::Orphan {
                    id: post.id.clone(),
                    parent: parent_id.clone(),
                })?;
                if parent.root_id != post.root_id {
                    return Err(StoreError::RootMismatch {
                        id: post.id.clone(),
                        expected: parent.root_id.clone(),
                        found: post.root_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn link(&mut self, post: &Post) {
        if let Some(ref parent) = post.parent_id {
            let siblings = self.children.entry(parent.clone()).or_default();
            if !siblings.contains(&post.id) {
                siblings.push(post.id.clone());
            }
        }
    }

    fn unlink(&mut self, id: &PostId, parent: Option<&PostId>) {
        if let Some(parent) = parent {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.retain(|c| c != id);
            }
        }
    }

    /// Insert or merge a server copy. Server fields overwrite local
    /// estimates; the caller's vote and the reply count only when the
    /// server sent them. Parent and root of an existing entry never change.
    pub(crate) fn upsert(&mut self, copy: impl Into<ServerCopy>) -> Result<u64, StoreError> {
        let ServerCopy {
            post,
            user_vote,
            reply_count,
        }: ServerCopy = copy.into();
        if self.entries.contains_key(&post.id) {
            let generation = self.bump();
            let entry = self
                .entries
                .get_mut(&post.id)
                .ok_or_else(|| StoreError::NotFound(post.id.clone()))?;

            if entry.post.parent_id != post.parent_id || entry.post.root_id != post.root_id {
                tracing::warn!(
                    "Ignoring structural change for {} from server copy",
                    post.id
                );
            }

            let existing = &mut entry.post;
            existing.content = post.content;
            existing.score = post.score;
            if let Some(vote) = user_vote {
                existing.user_vote = vote;
            }
            existing.status = post.status;
            existing.author = post.author;
            existing.created_at = post.created_at;
            existing.updated_at = post.updated_at;
            if let Some(count) = reply_count {
                existing.reply_count = count;
            }
            existing.pending = post.pending;
            entry.generation = generation;
            return Ok(generation);
        }

        self.check_structure(&post)?;
        self.link(&post);
        let generation = self.bump();
        self.entries.insert(post.id.clone(), Entry { post, generation });
        Ok(generation)
    }

    pub(crate) fn patch(&mut self, id: &PostId, patch: &PostPatch) -> Result<u64, StoreError> {
        let generation = self.bump();
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        patch.apply_to(&mut entry.post);
        entry.generation = generation;
        Ok(generation)
    }

    /// Adjust the direct reply count. Counts are thread bookkeeping rather
    /// than part of a post's optimistic state, so the generation is kept.
    pub(crate) fn set_reply_count(&mut self, id: &PostId, count: u64) -> Result<(), StoreError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.post.reply_count = count;
        Ok(())
    }

    /// Put back a snapshot taken before an optimistic change. Structure and
    /// the reply count stay as they are now.
    pub(crate) fn restore(&mut self, snapshot: Post) -> Result<u64, StoreError> {
        let generation = self.bump();
        let entry = self
            .entries
            .get_mut(&snapshot.id)
            .ok_or_else(|| StoreError::NotFound(snapshot.id.clone()))?;
        entry.post = Post {
            parent_id: entry.post.parent_id.clone(),
            root_id: entry.post.root_id.clone(),
            reply_count: entry.post.reply_count,
            ..snapshot
        };
        entry.generation = generation;
        Ok(generation)
    }

    /// Drop an unconfirmed post. Confirmed posts only ever change status.
    pub(crate) fn remove(&mut self, id: &PostId) -> Result<Post, StoreError> {
        let pending = self
            .get(id)
            .map(|p| p.pending && p.id.is_pending())
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !pending {
            return Err(StoreError::NotPending(id.clone()));
        }

        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.unlink(id, entry.post.parent_id.as_ref());
        self.children.remove(id);
        Ok(entry.post)
    }

    /// Replace a pending entry with its server copy.
    ///
    /// The placeholder disappears, the server id takes its slot among its
    /// siblings, and parent/root come from the placeholder. If the server id
    /// is already present (a page load raced the create) the two merge.
    pub(crate) fn confirm(
        &mut self,
        temp: &PostId,
        server: impl Into<ServerCopy>,
    ) -> Result<u64, StoreError> {
        let mut copy: ServerCopy = server.into();
        let server = &mut copy.post;
        let placeholder = self
            .entries
            .remove(temp)
            .ok_or_else(|| StoreError::NotFound(temp.clone()))?
            .post;

        server.parent_id = placeholder.parent_id.clone();
        server.root_id = if placeholder.parent_id.is_none() {
            server.id.clone()
        } else {
            placeholder.root_id.clone()
        };
        server.pending = false;

        let already_known = self.entries.contains_key(&server.id);
        if let Some(ref parent) = placeholder.parent_id {
            if let Some(siblings) = self.children.get_mut(parent) {
                if already_known {
                    siblings.retain(|c| c != temp);
                } else if let Some(slot) = siblings.iter_mut().find(|c| *c == temp) {
                    *slot = server.id.clone();
                }
            }
        }
        self.children.remove(temp);

        self.upsert(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, PostStatus, Vote};
    use chrono::Utc;

    fn post(id: PostId, parent: Option<PostId>, root: PostId) -> Post {
        let now = Utc::now();
        Post {
            id,
            parent_id: parent,
            root_id: root,
            content: "hello".into(),
            score: 0,
            user_vote: Vote::None,
            status: PostStatus::Active,
            author: Author {
                id: None,
                username: "kana".into(),
                avatar_url: None,
            },
            created_at: now,
            updated_at: now,
            reply_count: 0,
            pending: false,
        }
    }

    fn root(id: &str) -> Post {
        let id = PostId::confirmed(id);
        post(id.clone(), None, id)
    }

    fn reply(id: &str, parent: &str, root: &str) -> Post {
        post(
            PostId::confirmed(id),
            Some(PostId::confirmed(parent)),
            PostId::confirmed(root),
        )
    }

    #[test]
    fn upsert_then_get() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();
        assert_eq!(store.get(&PostId::confirmed("c1")).unwrap().content, "hello");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn root_must_point_at_itself() {
        let mut store = EntityStore::new();
        let bad = post(PostId::confirmed("c1"), None, PostId::confirmed("c9"));
        assert!(matches!(store.upsert(bad), Err(StoreError::RootMismatch { .. })));
    }

    #[test]
    fn reply_needs_known_parent() {
        let mut store = EntityStore::new();
        let result = store.upsert(reply("r1", "c1", "c1"));
        assert!(matches!(result, Err(StoreError::Orphan { .. })));
    }

    #[test]
    fn reply_root_must_match_parent_root() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();
        store.upsert(reply("r1", "c1", "c1")).unwrap();

        let result = store.upsert(reply("r2", "r1", "r1"));
        assert!(matches!(result, Err(StoreError::RootMismatch { .. })));

        store.upsert(reply("r2", "r1", "c1")).unwrap();
        assert_eq!(
            store.ancestors(&PostId::confirmed("r2")),
            vec![PostId::confirmed("r1"), PostId::confirmed("c1")]
        );
    }

    #[test]
    fn upsert_overwrites_estimates_but_not_structure() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();
        store.upsert(reply("r1", "c1", "c1")).unwrap();
        store
            .patch(
                &PostId::confirmed("r1"),
                &PostPatch {
                    score: Some(6),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut server = reply("r1", "c1", "c1");
        server.score = 9;
        server.parent_id = None;
        server.root_id = PostId::confirmed("r1");
        store.upsert(server).unwrap();

        let r1 = store.get(&PostId::confirmed("r1")).unwrap();
        assert_eq!(r1.score, 9);
        assert_eq!(r1.parent_id, Some(PostId::confirmed("c1")));
        assert_eq!(r1.root_id, PostId::confirmed("c1"));
    }

    #[test]
    fn merge_keeps_fields_the_server_left_out() {
        let mut store = EntityStore::new();
        let id = PostId::confirmed("c1");
        let mut known = root("c1");
        known.user_vote = Vote::Up;
        known.reply_count = 4;
        store.upsert(known).unwrap();

        let mut refreshed = root("c1");
        refreshed.score = 7;
        store
            .upsert(ServerCopy {
                post: refreshed,
                user_vote: None,
                reply_count: None,
            })
            .unwrap();

        let post = store.get(&id).unwrap();
        assert_eq!(post.score, 7);
        assert_eq!(post.user_vote, Vote::Up);
        assert_eq!(post.reply_count, 4);

        store
            .upsert(ServerCopy {
                post: root("c1"),
                user_vote: Some(Vote::None),
                reply_count: Some(1),
            })
            .unwrap();
        let post = store.get(&id).unwrap();
        assert_eq!(post.user_vote, Vote::None);
        assert_eq!(post.reply_count, 1);
    }

    #[test]
    fn generation_changes_on_every_mutation() {
        let mut store = EntityStore::new();
        let id = PostId::confirmed("c1");
        let g1 = store.upsert(root("c1")).unwrap();
        let g2 = store.patch(&id, &PostPatch::default()).unwrap();
        let g3 = store.upsert(root("c1")).unwrap();
        assert!(g1 < g2 && g2 < g3);
        assert_eq!(store.generation(&id), Some(g3));
    }

    #[test]
    fn only_pending_posts_can_be_removed() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();
        assert_eq!(
            store.remove(&PostId::confirmed("c1")),
            Err(StoreError::NotPending(PostId::confirmed("c1")))
        );

        let mut temp = post(PostId::Pending(1), Some(PostId::confirmed("c1")), PostId::confirmed("c1"));
        temp.pending = true;
        store.upsert(temp).unwrap();
        assert_eq!(store.children_of(&PostId::confirmed("c1")).len(), 1);

        store.remove(&PostId::Pending(1)).unwrap();
        assert!(store.get(&PostId::Pending(1)).is_none());
        assert!(store.children_of(&PostId::confirmed("c1")).is_empty());
    }

    #[test]
    fn confirm_rekeys_in_place() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();
        store.upsert(reply("r1", "c1", "c1")).unwrap();

        let mut temp = post(PostId::Pending(4), Some(PostId::confirmed("c1")), PostId::confirmed("c1"));
        temp.pending = true;
        store.upsert(temp).unwrap();
        store.upsert(reply("r3", "c1", "c1")).unwrap();

        // Server copy without structural fields filled in.
        let server = post(PostId::confirmed("r2"), None, PostId::confirmed("r2"));
        store.confirm(&PostId::Pending(4), server).unwrap();

        assert!(store.get(&PostId::Pending(4)).is_none());
        let r2 = store.get(&PostId::confirmed("r2")).unwrap();
        assert!(!r2.pending);
        assert_eq!(r2.parent_id, Some(PostId::confirmed("c1")));
        assert_eq!(r2.root_id, PostId::confirmed("c1"));
        assert_eq!(
            store.children_of(&PostId::confirmed("c1")),
            &[
                PostId::confirmed("r1"),
                PostId::confirmed("r2"),
                PostId::confirmed("r3")
            ]
        );
    }

    #[test]
    fn confirm_merges_with_existing_server_copy() {
        let mut store = EntityStore::new();
        store.upsert(root("c1")).unwrap();

        let mut temp = post(PostId::Pending(1), Some(PostId::confirmed("c1")), PostId::confirmed("c1"));
        temp.pending = true;
        store.upsert(temp).unwrap();
        store.upsert(reply("r1", "c1", "c1")).unwrap();

        store.confirm(&PostId::Pending(1), reply("r1", "c1", "c1")).unwrap();
        assert_eq!(store.children_of(&PostId::confirmed("c1")), &[PostId::confirmed("r1")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reply_count_changes_keep_generation() {
        let mut store = EntityStore::new();
        let id = PostId::confirmed("c1");
        let generation = store.upsert(root("c1")).unwrap();
        store.set_reply_count(&id, 3).unwrap();
        assert_eq!(store.generation(&id), Some(generation));

        let snapshot = store.get(&id).cloned().unwrap();
        store.set_reply_count(&id, 4).unwrap();
        store.restore(snapshot).unwrap();
        assert_eq!(store.get(&id).unwrap().reply_count, 4);
    }

    #[test]
    fn restore_puts_back_snapshot() {
        let mut store = EntityStore::new();
        let id = PostId::confirmed("c1");
        let mut original = root("c1");
        original.score = 5;
        store.upsert(original.clone()).unwrap();

        store
            .patch(
                &id,
                &PostPatch {
                    score: Some(6),
                    user_vote: Some(Vote::Up),
                    ..Default::default()
                },
            )
            .unwrap();
        store.restore(original.clone()).unwrap();
        assert_eq!(store.get(&id), Some(&original));
    }
}
