//! Typed access to the comment API, plus the client-side section controller.

mod section;
#[cfg(test)]
pub(crate) mod fake;

pub use section::{CommentSection, LOAD_FAILURE, ModerationAlert, SectionState};

use std::future::Future;

use serde::Deserialize;

use crate::models::{Comment, CommentNode, CreateComment};
use crate::moderation::{ModerationAction, ModerationRequest};

pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server responded with {status}: {}", .message.as_deref().unwrap_or(GENERIC_FAILURE))]
    Server {
        status: u16,
        message: Option<String>,
    },
}

impl ClientError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: Some(message.into()),
        }
    }

    /// Text shown to the user: the server's `error` field when there was one.
    pub fn alert_message(&self) -> String {
        match self {
            Self::Server {
                message: Some(message),
                ..
            } => message.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// The four calls the comment UI makes against the store.
pub trait CommentApi {
    fn fetch_thread(
        &self,
        article_id: i64,
        admin: bool,
    ) -> impl Future<Output = Result<Vec<CommentNode>, ClientError>> + Send;

    fn create_comment(
        &self,
        input: &CreateComment,
    ) -> impl Future<Output = Result<Comment, ClientError>> + Send;

    fn moderate(
        &self,
        comment_id: i64,
        action: ModerationAction,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn delete_comment(&self, comment_id: i64)
    -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Extracts `{ "error": "..." }` from a failed response body, if present.
pub fn parse_error_body(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .filter(|message| !message.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct HttpCommentApi {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl HttpCommentApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            token: None,
        }
    }

    /// Attaches the caller's session token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_error_body(&body);
        tracing::warn!(
            status = status.as_u16(),
            error = message.as_deref().unwrap_or(""),
            "Comment API request failed"
        );
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl CommentApi for HttpCommentApi {
    async fn fetch_thread(
        &self,
        article_id: i64,
        admin: bool,
    ) -> Result<Vec<CommentNode>, ClientError> {
        let mut query = vec![("articleId", article_id.to_string())];
        if admin {
            query.push(("admin", "true".to_string()));
        }

        let request = self.http.get(self.url("/api/comments")).query(&query);
        let response = self.authorize(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_comment(&self, input: &CreateComment) -> Result<Comment, ClientError> {
        let request = self.http.post(self.url("/api/comments")).json(input);
        let response = self.authorize(request).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn moderate(&self, comment_id: i64, action: ModerationAction) -> Result<(), ClientError> {
        let request = self
            .http
            .put(self.url(&format!("/api/comments/{comment_id}")))
            .json(&ModerationRequest { action });
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), ClientError> {
        let request = self
            .http
            .delete(self.url(&format!("/api/comments/{comment_id}")));
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
