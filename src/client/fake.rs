//! In-memory stand-in for the comment API, used by unit tests.

use std::sync::Mutex;

use chrono::Utc;

use super::{ClientError, CommentApi};
use crate::models::{Comment, CommentNode, CreateComment};
use crate::moderation::ModerationAction;
use crate::tree::build_tree;

/// In-memory store standing in for the HTTP API.
#[derive(Default)]
pub struct FakeApi {
    pub comments: Mutex<Vec<Comment>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_with: Mutex<Option<ClientError>>,
    pub fail_fetch: Mutex<bool>,
}

impl FakeApi {
    pub fn with_comments(comments: Vec<Comment>) -> Self {
        Self {
            comments: Mutex::new(comments),
            ..Default::default()
        }
    }

    pub fn fail_next(&self, err: ClientError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call);
        match self.fail_with.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

pub fn comment(id: i64, parent_id: Option<i64>, approved: bool) -> Comment {
    Comment {
        id,
        article_id: 1,
        parent_id,
        content: format!("comment {id}"),
        author_name: Some(format!("fan{id}")),
        author_email: None,
        author_url: None,
        user_id: None,
        approved,
        created_at: Utc::now(),
        avatar_url: None,
    }
}

impl CommentApi for FakeApi {
    async fn fetch_thread(
        &self,
        article_id: i64,
        admin: bool,
    ) -> Result<Vec<CommentNode>, ClientError> {
        self.calls.lock().unwrap().push(format!("fetch {article_id}"));
        if *self.fail_fetch.lock().unwrap() {
            return Err(ClientError::server(500, "Database unavailable"));
        }
        let rows = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.article_id == article_id && (admin || c.approved))
            .cloned()
            .collect();
        Ok(build_tree(rows))
    }

    async fn create_comment(&self, input: &CreateComment) -> Result<Comment, ClientError> {
        self.record(format!("create {}", input.content))?;
        let mut comments = self.comments.lock().unwrap();
        let created = Comment {
            id: comments.len() as i64 + 100,
            article_id: input.article_id,
            parent_id: input.parent_id,
            content: input.content.clone(),
            author_name: input.author_name.clone(),
            author_email: input.author_email.clone(),
            author_url: input.author_url.clone(),
            user_id: None,
            approved: true,
            created_at: Utc::now(),
            avatar_url: None,
        };
        comments.push(created.clone());
        Ok(created)
    }

    async fn moderate(
        &self,
        comment_id: i64,
        action: ModerationAction,
    ) -> Result<(), ClientError> {
        self.record(format!("{} {comment_id}", action.as_str()))?;
        let mut comments = self.comments.lock().unwrap();
        if let Some(c) = comments.iter_mut().find(|c| c.id == comment_id) {
            c.approved = action == ModerationAction::Approve;
        }
        Ok(())
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), ClientError> {
        self.record(format!("delete {comment_id}"))?;
        self.comments.lock().unwrap().retain(|c| c.id != comment_id);
        Ok(())
    }
}
