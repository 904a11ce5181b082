use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub article_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_url: Option<String>,
    pub user_id: Option<i64>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    /// Filled in by the server when the email itself is withheld.
    #[sqlx(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A comment together with its nested replies, in store order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn leaf(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.comment.id
    }

    /// Number of comments below this node, at any depth.
    pub fn reply_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&CommentNode> = self.replies.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComment {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    pub article_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Comment content is required")]
    EmptyContent,
    #[error("Website must be an http or https URL")]
    InvalidUrl,
}

/// True for absolute `http`/`https` URLs, the only links rendered for authors.
pub fn is_web_url(url: &str) -> bool {
    let url = url.trim();
    ["http://", "https://"].iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
            && url.len() > scheme.len()
    })
}

impl CreateComment {
    /// Trims every text field and drops optional fields that end up empty.
    pub fn normalize(self) -> Result<Self, ValidationError> {
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        let author_url = non_empty(self.author_url);
        if author_url.as_deref().is_some_and(|url| !is_web_url(url)) {
            return Err(ValidationError::InvalidUrl);
        }

        Ok(Self {
            content,
            author_name: non_empty(self.author_name),
            author_email: non_empty(self.author_email),
            author_url,
            article_id: self.article_id,
            parent_id: self.parent_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub id: i64,
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub id: i64,
    pub deleted: bool,
}
