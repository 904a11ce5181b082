use axum::{
    Form, Router,
    extract::{
        Path, Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::HeaderMap,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::AppState;
use crate::client::LOAD_FAILURE;
use crate::composer::{CommentDraft, Composer, ReplyTarget};
use crate::error::{AppError, AppResult};
use crate::models::CreateComment;
use crate::moderation::{Lifecycle, ModerationAction, ModerationCommand};
use crate::routes::auth::{extract_admin_user, extract_optional_user};
use crate::routes::comments::{apply_command, ensure_article_exists, fetch_article_comments, insert_comment};
use crate::thread::{
    RenderOptions, SectionContent, ThreadRenderer, ThreadState, display_name, render_section,
};
use crate::tree::{build_tree, find_node};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionQuery {
    pub reply_to: Option<i64>,
    pub expanded: Option<String>,
}

/// Fields of the composer form rendered into the page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_url: Option<String>,
    pub parent_id: Option<i64>,
    pub expanded: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormAction {
    Approve,
    Reject,
    Delete,
}

impl From<FormAction> for ModerationCommand {
    fn from(action: FormAction) -> Self {
        match action {
            FormAction::Approve => Self::Moderate(ModerationAction::Approve),
            FormAction::Reject => Self::Moderate(ModerationAction::Reject),
            FormAction::Delete => Self::Delete,
        }
    }
}

/// Fields of a moderation form; `replyTo`/`expanded` carry the page state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationForm {
    pub action: FormAction,
    pub reply_to: Option<i64>,
    pub expanded: Option<String>,
}

pub fn pages_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{article_id}/comments",
            get(comment_section).post(submit_comment_form),
        )
        .route(
            "/{article_id}/comments/{comment_id}/moderate",
            post(moderate_comment_form),
        )
}

fn section_href(article_id: i64, thread: &ThreadState) -> String {
    format!("/articles/{article_id}/comments{}", thread.to_query())
}

async fn is_admin(state: &AppState, headers: &HeaderMap) -> AppResult<bool> {
    Ok(extract_optional_user(state, headers)
        .await?
        .is_some_and(|user| user.is_admin))
}

/// Renders the whole section. A failed load shows the error panel instead.
async fn render_page(
    state: &AppState,
    article_id: i64,
    thread: &ThreadState,
    admin: bool,
    composer: Option<Composer>,
    reply_composer: Option<&Composer>,
) -> AppResult<String> {
    let options = RenderOptions {
        max_depth: state.config.max_reply_depth,
        admin,
        avatar_base_url: state.config.avatar_base_url.clone(),
    };
    let renderer = ThreadRenderer {
        article_id,
        state: thread,
        options: &options,
        reply_composer,
    };
    let composer = composer.unwrap_or_else(|| Composer::new(article_id));

    let roots = match fetch_article_comments(state, article_id, admin).await {
        Ok(comments) => Some(build_tree(comments)),
        Err(err) => {
            tracing::error!(article_id, error = %err, "Failed to load comments");
            None
        }
    };

    let content = match &roots {
        Some(roots) => SectionContent::Thread {
            roots,
            composer: &composer,
            notice: None,
        },
        None => SectionContent::Failed(LOAD_FAILURE),
    };

    render_section(&renderer, content).map_err(|e| AppError::Internal(e.to_string()))
}

async fn comment_section(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    headers: HeaderMap,
    query: Result<Query<SectionQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(query) = query?;
    let admin = is_admin(&state, &headers).await?;

    ensure_article_exists(&state, article_id).await?;

    let thread = ThreadState::from_query(query.reply_to, query.expanded.as_deref());
    let html = render_page(&state, article_id, &thread, admin, None, None).await?;
    Ok(Html(html))
}

/// Handles the composer form. Success redirects back with the reply closed
/// and its parent expanded; a rejected draft is re-rendered with the error.
async fn submit_comment_form(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    headers: HeaderMap,
    form: Result<Form<CommentForm>, FormRejection>,
) -> AppResult<Response> {
    let Form(form) = form?;
    let user = extract_optional_user(&state, &headers).await?;
    let admin = user.as_ref().is_some_and(|user| user.is_admin);

    ensure_article_exists(&state, article_id).await?;

    let mut thread = ThreadState::from_query(None, form.expanded.as_deref());
    let draft = CommentDraft {
        content: form.content.clone(),
        author_name: form.author_name.clone().unwrap_or_default(),
        author_email: form.author_email.clone().unwrap_or_default(),
        author_url: form.author_url.clone().unwrap_or_default(),
    };

    let submitted = match (CreateComment {
        content: form.content,
        author_name: form.author_name,
        author_email: form.author_email,
        author_url: form.author_url,
        article_id,
        parent_id: form.parent_id,
    })
    .normalize()
    {
        Ok(input) => insert_comment(&state, &input, user.as_ref()).await,
        Err(err) => Err(err.into()),
    };

    let message = match submitted {
        Ok(comment) => {
            if let Some(parent_id) = comment.parent_id {
                thread.expand(parent_id);
            }
            return Ok(Redirect::to(&section_href(article_id, &thread)).into_response());
        }
        Err(err @ (AppError::BadRequest(_) | AppError::NotFound(_))) => err,
        Err(err) => return Err(err),
    };
    tracing::debug!(article_id, error = %message, "Comment form rejected");

    // Reopen the reply form on its parent when the parent is still there.
    let reply_target = match form.parent_id {
        Some(parent_id) => fetch_article_comments(&state, article_id, admin)
            .await
            .ok()
            .and_then(|comments| {
                let roots = build_tree(comments);
                find_node(&roots, parent_id).map(|node| ReplyTarget {
                    comment_id: parent_id,
                    author_name: display_name(node),
                })
            }),
        None => None,
    };

    let mut composer = match reply_target {
        Some(target) => {
            thread.toggle_reply(target.comment_id);
            Composer::reply(article_id, target)
        }
        None => Composer::new(article_id),
    };
    composer.draft = draft;
    composer.fail(message.to_string());

    let status = message.status();
    let html = if composer.target().is_some() {
        render_page(&state, article_id, &thread, admin, None, Some(&composer)).await?
    } else {
        render_page(&state, article_id, &thread, admin, Some(composer), None).await?
    };
    Ok((status, Html(html)).into_response())
}

async fn moderate_comment_form(
    State(state): State<AppState>,
    Path((article_id, comment_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    form: Result<Form<ModerationForm>, FormRejection>,
) -> AppResult<Redirect> {
    let admin = extract_admin_user(&state, &headers).await?;
    let Form(form) = form?;

    let command = ModerationCommand::from(form.action);
    let next = apply_command(&state, comment_id, command).await?;
    tracing::info!(
        comment_id,
        command = ?command,
        moderator = %admin.username,
        "Comment moderated from page"
    );

    let mut thread = ThreadState::from_query(form.reply_to, form.expanded.as_deref());
    if next == Lifecycle::Deleted && thread.is_replying_to(comment_id) {
        thread.close_reply();
    }
    Ok(Redirect::to(&section_href(article_id, &thread)))
}
