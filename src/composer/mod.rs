//! Draft state for a new comment or a reply.

use std::time::Duration;

use crate::client::{ClientError, CommentApi};
use crate::models::{Comment, CreateComment, ValidationError};

/// Pause between a successful submit and the completion signal to the parent.
pub const COMPLETION_DELAY: Duration = Duration::from_millis(1500);

pub const SUBMITTED_MESSAGE: &str = "Thanks! Your comment has been submitted.";

/// The comment a reply composer answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub comment_id: i64,
    pub author_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentDraft {
    pub content: String,
    pub author_name: String,
    pub author_email: String,
    pub author_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComposerStatus {
    #[default]
    Idle,
    Submitting,
    Submitted,
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a submission is already in flight")]
    Busy,
    #[error(transparent)]
    Request(#[from] ClientError),
}

#[derive(Debug, Clone)]
pub struct Composer {
    article_id: i64,
    target: Option<ReplyTarget>,
    pub draft: CommentDraft,
    status: ComposerStatus,
}

impl Composer {
    pub fn new(article_id: i64) -> Self {
        Self {
            article_id,
            target: None,
            draft: CommentDraft::default(),
            status: ComposerStatus::Idle,
        }
    }

    pub fn reply(article_id: i64, target: ReplyTarget) -> Self {
        Self {
            target: Some(target),
            ..Self::new(article_id)
        }
    }

    pub fn article_id(&self) -> i64 {
        self.article_id
    }

    pub fn target(&self) -> Option<&ReplyTarget> {
        self.target.as_ref()
    }

    pub fn status(&self) -> &ComposerStatus {
        &self.status
    }

    /// True while a request is in flight; the submit control is disabled.
    pub fn is_busy(&self) -> bool {
        self.status == ComposerStatus::Submitting
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ComposerStatus::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn confirmation(&self) -> Option<&'static str> {
        (self.status == ComposerStatus::Submitted).then_some(SUBMITTED_MESSAGE)
    }

    /// Header line of a reply composer.
    pub fn header(&self) -> Option<String> {
        self.target
            .as_ref()
            .map(|target| format!("Replying to {}", target.author_name))
    }

    pub fn dismiss_error(&mut self) {
        if matches!(self.status, ComposerStatus::Failed(_)) {
            self.status = ComposerStatus::Idle;
        }
    }

    /// Records a rejection that happened outside `submit`; the draft is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ComposerStatus::Failed(message.into());
    }

    /// Validated, normalized request body for the current draft.
    pub fn prepare(&self) -> Result<CreateComment, ValidationError> {
        CreateComment {
            content: self.draft.content.clone(),
            author_name: Some(self.draft.author_name.clone()),
            author_email: Some(self.draft.author_email.clone()),
            author_url: Some(self.draft.author_url.clone()),
            article_id: self.article_id,
            parent_id: self.target.as_ref().map(|target| target.comment_id),
        }
        .normalize()
    }

    /// Sends the draft. Invalid drafts never reach `api`; a failed request
    /// keeps the draft for retry, a successful one clears it.
    pub async fn submit<A: CommentApi>(&mut self, api: &A) -> Result<Comment, ComposerError> {
        if self.is_busy() {
            return Err(ComposerError::Busy);
        }

        let request = match self.prepare() {
            Ok(request) => request,
            Err(err) => {
                self.status = ComposerStatus::Failed(err.to_string());
                return Err(err.into());
            }
        };

        self.status = ComposerStatus::Submitting;
        match api.create_comment(&request).await {
            Ok(comment) => {
                tracing::debug!(comment_id = comment.id, "Comment submitted");
                self.draft = CommentDraft::default();
                self.status = ComposerStatus::Submitted;
                Ok(comment)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Comment submission failed");
                self.status = ComposerStatus::Failed(err.alert_message());
                Err(err.into())
            }
        }
    }

    /// Discards the in-progress draft without sending anything.
    pub fn cancel(self) -> CommentDraft {
        self.draft
    }
}
