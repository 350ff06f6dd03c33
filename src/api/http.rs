//! JSON client for the comment backend behind the pass-through proxy.
//!
//! Every endpoint is a path relative to the configured base URL. Root
//! comments and replies live under separate endpoint families
//! (`comments-*` and `replies-*`); the post kind picks one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use super::wire::{
    BanRequest, CommentsPage, CreateComment, CreateReply, ErrorBody, PartialEnvelope,
    PostEnvelope, RepliesPage, ReportsResponse, StatusChange, UserEnvelope, VoteResponse,
};
use super::{BackendApi, CreateTarget, PostPartial, PostRef, RemotePage, RemotePost, VoteAck};
use crate::error::BackendError;
use crate::model::{
    Actor, BearerToken, MediaId, PostKind, PostStatus, Report, Session, UserId, VoteDirection,
};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| BackendError::Transport(format!("Invalid base URL {}: {}", base_url, e)))?;
        // Relative joins replace the last segment unless the path ends in '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Transport(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        credential: Option<&BearerToken>,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url).query(query), credential).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        credential: Option<&BearerToken>,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(path)?;
        tracing::debug!("POST {}", url);
        self.send(self.client.post(url).json(body), credential).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        credential: Option<&BearerToken>,
    ) -> Result<T, BackendError> {
        let request = match credential {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };
        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_response(status, &body)
    }
}

fn family(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Root => "comments",
        PostKind::Reply => "replies",
    }
}

fn id_field(kind: PostKind) -> &'static str {
    match kind {
        PostKind::Root => "comment_id",
        PostKind::Reply => "reply_id",
    }
}

/// `{comment_id | reply_id: id, ..extra}`
fn post_body(post: &PostRef, extra: Vec<(&str, Value)>) -> Value {
    let mut body = Map::new();
    body.insert(id_field(post.kind).to_string(), Value::String(post.id.clone()));
    for (key, value) in extra {
        body.insert(key.to_string(), value);
    }
    Value::Object(body)
}

/// Map a status and body to a decoded value or a typed failure.
pub(crate) fn decode_response<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> Result<T, BackendError> {
    if (200..300).contains(&status) {
        let body = if body.trim().is_empty() { "null" } else { body };
        return serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()));
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| "Server Error".to_string());
    Err(match status {
        401 => BackendError::Unauthorized(message),
        403 => BackendError::Forbidden(message),
        status => BackendError::Status { status, message },
    })
}

fn page_query(limit: usize, cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_string()));
    }
    query
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_roots(
        &self,
        session: &Session,
        media: &MediaId,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError> {
        let mut query = vec![("mediaId", media.to_string())];
        query.extend(page_query(limit, cursor));
        let page: CommentsPage = self
            .get(session.credential.as_ref(), "comments-list", &query)
            .await?;
        Ok(page.into())
    }

    async fn list_replies(
        &self,
        session: &Session,
        root: &str,
        parent: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<RemotePage, BackendError> {
        let mut query = vec![("comment_id", root.to_string())];
        if let Some(parent) = parent {
            query.push(("parent_id", parent.to_string()));
        }
        query.extend(page_query(limit, cursor));
        let page: RepliesPage = self
            .get(session.credential.as_ref(), "replies-list", &query)
            .await?;
        Ok(page.into())
    }

    async fn create_post(
        &self,
        session: &Session,
        target: &CreateTarget,
        content: &str,
    ) -> Result<RemotePost, BackendError> {
        let credential = session.credential.as_ref();
        let envelope: PostEnvelope = match target {
            CreateTarget::Media(media) => {
                let body = CreateComment {
                    media_id: media.as_str(),
                    content,
                };
                self.post(credential, "comments-create", &body).await?
            }
            CreateTarget::Reply { root, parent } => {
                let body = CreateReply {
                    comment_id: root,
                    parent_id: parent.as_deref(),
                    content,
                };
                self.post(credential, "replies-create", &body).await?
            }
        };
        Ok(envelope.post)
    }

    async fn edit_post(
        &self,
        session: &Session,
        post: &PostRef,
        content: &str,
    ) -> Result<RemotePost, BackendError> {
        let path = format!("{}-update", family(post.kind));
        let body = post_body(post, vec![("content", Value::from(content))]);
        let envelope: PostEnvelope = self
            .post(session.credential.as_ref(), &path, &body)
            .await?;
        Ok(envelope.post)
    }

    async fn delete_post(&self, session: &Session, post: &PostRef) -> Result<(), BackendError> {
        let path = format!("{}-delete", family(post.kind));
        let _: IgnoredAny = self
            .post(session.credential.as_ref(), &path, &post_body(post, Vec::new()))
            .await?;
        Ok(())
    }

    async fn vote(
        &self,
        session: &Session,
        post: &PostRef,
        vote: VoteDirection,
    ) -> Result<VoteAck, BackendError> {
        let path = format!("{}-vote", family(post.kind));
        let body = post_body(post, vec![("vote_type", Value::from(vote.value()))]);
        let response: VoteResponse = self
            .post(session.credential.as_ref(), &path, &body)
            .await?;
        Ok(VoteAck {
            post_id: response.post_id,
            score: response.score,
        })
    }

    async fn report(
        &self,
        session: &Session,
        post: &PostRef,
        reason: &str,
    ) -> Result<(), BackendError> {
        // Reports on replies go through the same endpoint, keyed by id.
        let body = serde_json::json!({ "comment_id": post.id, "reason": reason });
        let _: IgnoredAny = self
            .post(session.credential.as_ref(), "comments-report", &body)
            .await?;
        Ok(())
    }

    async fn list_reports(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Report>, BackendError> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        let response: ReportsResponse = self
            .get(session.credential.as_ref(), "moderation-reports", &query)
            .await?;
        Ok(response.reports)
    }

    async fn set_status(
        &self,
        session: &Session,
        post_id: &str,
        status: PostStatus,
    ) -> Result<PostPartial, BackendError> {
        let body = StatusChange {
            comment_id: post_id,
            status,
        };
        let envelope: PartialEnvelope = self
            .post(session.credential.as_ref(), "moderation-comment-status", &body)
            .await?;
        Ok(envelope.comment)
    }

    async fn ban_user(&self, session: &Session, user: &UserId) -> Result<(), BackendError> {
        let _: IgnoredAny = self
            .post(
                session.credential.as_ref(),
                "moderation-ban-user",
                &BanRequest { user_id: user },
            )
            .await?;
        Ok(())
    }

    async fn current_user(&self, credential: &BearerToken) -> Result<Actor, BackendError> {
        let envelope: UserEnvelope = self.get(Some(credential), "auth-me", &[]).await?;
        Ok(envelope.user)
    }
}
