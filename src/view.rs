// Nested thread views built from the flat store. Never written back.
use crate::model::{MediaId, Post, PostId, PostStatus};
use crate::sync::{CursorRegistry, EntityStore, Scope};

/// Which statuses a view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Active posts only. Hidden, removed and deleted posts are left out
    /// along with their replies.
    #[default]
    Feed,
    /// Shows every status.
    Moderation,
}

impl Visibility {
    pub fn shows(self, status: PostStatus) -> bool {
        match self {
            Visibility::Feed => status == PostStatus::Active,
            Visibility::Moderation => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadNode {
    pub post: Post,
    /// Loaded direct replies, in list order.
    pub replies: Vec<ThreadNode>,
    /// More replies exist on the server than are listed here.
    pub has_more: bool,
}

pub(crate) fn build_thread(
    store: &EntityStore,
    cursors: &CursorRegistry,
    media: &MediaId,
    visibility: Visibility,
) -> Vec<ThreadNode> {
    cursors
        .items(&Scope::roots(media.clone()))
        .iter()
        .filter_map(|id| build_node(store, cursors, id, visibility))
        .collect()
}

fn build_node(
    store: &EntityStore,
    cursors: &CursorRegistry,
    id: &PostId,
    visibility: Visibility,
) -> Option<ThreadNode> {
    let post = store.get(id)?;
    if !visibility.shows(post.status) {
        return None;
    }

    let scope = Scope::replies_of(post);
    let listed = cursors.items(&scope);
    let has_more = match cursors.get(&scope) {
        Some(state) if state.loaded => !state.exhausted,
        _ => post.reply_count > listed.len() as u64,
    };
    let replies = listed
        .iter()
        .filter_map(|child| build_node(store, cursors, child, visibility))
        .collect();

    Some(ThreadNode {
        post: post.clone(),
        replies,
        has_more,
    })
}
