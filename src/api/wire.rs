// JSON envelopes of the HTTP binding.
use serde::{Deserialize, Serialize};

use super::{PostPartial, RemotePage, RemotePost};
use crate::model::{Actor, PostStatus, Report, UserId};

#[derive(Debug, Deserialize)]
pub(crate) struct CommentsPage {
    #[serde(default)]
    pub comments: Vec<RemotePost>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default, alias = "totalCount")]
    pub total_count: Option<u64>,
}

impl From<CommentsPage> for RemotePage {
    fn from(page: CommentsPage) -> Self {
        RemotePage {
            posts: page.comments,
            total: page.total_count,
            next_cursor: page.next_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepliesPage {
    #[serde(default)]
    pub replies: Vec<RemotePost>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default, alias = "reply_count", alias = "replyCount")]
    pub replies_count: Option<u64>,
}

impl From<RepliesPage> for RemotePage {
    fn from(page: RepliesPage) -> Self {
        RemotePage {
            posts: page.replies,
            total: page.replies_count,
            next_cursor: page.next_cursor,
        }
    }
}

/// `{comment}` from the comments family, `{reply}` from the replies family.
#[derive(Debug, Deserialize)]
pub(crate) struct PostEnvelope {
    #[serde(alias = "comment", alias = "reply")]
    pub post: RemotePost,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PartialEnvelope {
    #[serde(default, alias = "post")]
    pub comment: PostPartial,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoteResponse {
    #[serde(alias = "comment_id", alias = "reply_id")]
    pub post_id: String,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReportsResponse {
    #[serde(default)]
    pub reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserEnvelope {
    pub user: Actor,
}

/// Error body returned with a non-success status.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateComment<'a> {
    #[serde(rename = "mediaId")]
    pub media_id: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateReply<'a> {
    pub comment_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<&'a str>,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusChange<'a> {
    pub comment_id: &'a str,
    pub status: PostStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct BanRequest<'a> {
    pub user_id: &'a UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_page_without_total() {
        let json = r#"{
            "comments": [{
                "id": "c1",
                "content": "first",
                "score": 2,
                "status": "active",
                "username": "kana",
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z",
                "has_more_replies": true,
                "replies_count": 4,
                "user_vote": 1
            }],
            "next_cursor": null
        }"#;
        let page: RemotePage = serde_json::from_str::<CommentsPage>(json).unwrap().into();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].replies_count, Some(4));
        assert_eq!(page.posts[0].user_vote, Some(1));
        assert!(page.next_cursor.is_none());
        assert!(page.total.is_none());
    }

    #[test]
    fn reply_without_status_defaults_to_active() {
        let json = r#"{
            "replies": [{
                "id": "r1",
                "content": "hi",
                "score": 0,
                "username": "mio",
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z",
                "user_vote": null
            }],
            "next_cursor": "r1",
            "replies_count": 7
        }"#;
        let page: RemotePage = serde_json::from_str::<RepliesPage>(json).unwrap().into();
        assert_eq!(page.posts[0].status, PostStatus::Active);
        assert_eq!(page.posts[0].user_vote, None);
        assert_eq!(page.total, Some(7));
        assert_eq!(page.next_cursor.as_deref(), Some("r1"));
    }

    #[test]
    fn vote_response_accepts_either_id_name() {
        let reply: VoteResponse = serde_json::from_str(r#"{"reply_id":"r1","score":3}"#).unwrap();
        assert_eq!(reply.post_id, "r1");
        let comment: VoteResponse =
            serde_json::from_str(r#"{"comment_id":"c1","score":-2}"#).unwrap();
        assert_eq!(comment.score, -2);
    }

    #[test]
    fn create_comment_uses_camel_case_media_id() {
        let body = serde_json::to_value(CreateComment {
            media_id: "m1",
            content: "hello",
        })
        .unwrap();
        assert_eq!(body["mediaId"], "m1");
    }
}
