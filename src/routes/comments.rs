use axum::{
    Router,
    extract::{
        Json, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;

use crate::AppState;
use crate::avatar::avatar_url;
use crate::error::{AppError, AppResult};
use crate::models::{Comment, CreateComment, DeletionOutcome, ModerationOutcome, User};
use crate::moderation::{Lifecycle, ModerationCommand, ModerationRequest, ModerationState};
use crate::routes::auth::{extract_admin_user, extract_optional_user};
use crate::tree::build_tree;

/// Linked accounts override the free-text author fields.
const COMMENT_SELECT: &str = r#"
    SELECT
        c.id AS id,
        c.article_id AS article_id,
        c.parent_id AS parent_id,
        c.content AS content,
        COALESCE(u.display_name, u.username, c.author_name) AS author_name,
        COALESCE(u.email, c.author_email) AS author_email,
        c.author_url AS author_url,
        c.user_id AS user_id,
        c.approved AS approved,
        c.created_at AS created_at
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub article_id: i64,
    #[serde(default)]
    pub admin: bool,
}

pub fn comments_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route(
            "/{comment_id}",
            axum::routing::put(moderate_comment).delete(delete_comment),
        )
}

fn comment_not_found() -> AppError {
    AppError::NotFound("Comment not found".to_string())
}

/// Resolves the avatar server-side; the email itself is only kept for admins.
fn present(mut comment: Comment, reveal_email: bool, avatar_base_url: &str) -> Comment {
    comment.avatar_url = Some(avatar_url(comment.author_email.as_deref(), avatar_base_url));
    if !reveal_email {
        comment.author_email = None;
    }
    comment
}

pub(crate) async fn ensure_article_exists(state: &AppState, article_id: i64) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM articles WHERE id = ?")
        .bind(article_id)
        .fetch_optional(&state.pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("Article not found".to_string()));
    }
    Ok(())
}

/// Comments of one article in creation order. `admin` adds pending comments
/// and author emails.
pub(crate) async fn fetch_article_comments(
    state: &AppState,
    article_id: i64,
    admin: bool,
) -> AppResult<Vec<Comment>> {
    let sql = format!(
        "{COMMENT_SELECT} WHERE c.article_id = ? AND (c.approved = 1 OR ?) ORDER BY c.created_at ASC, c.id ASC"
    );
    let comments = sqlx::query_as::<_, Comment>(&sql)
        .bind(article_id)
        .bind(admin)
        .fetch_all(&state.pool)
        .await?;

    Ok(comments
        .into_iter()
        .map(|comment| present(comment, admin, &state.config.avatar_base_url))
        .collect())
}

/// Stores an already normalized comment after checking its article and
/// parent. Admin authors and `auto_approve` skip the moderation queue.
pub(crate) async fn insert_comment(
    state: &AppState,
    input: &CreateComment,
    user: Option<&User>,
) -> AppResult<Comment> {
    ensure_article_exists(state, input.article_id).await?;

    if let Some(parent_id) = input.parent_id {
        let parent_article = sqlx::query_scalar::<_, i64>("SELECT article_id FROM comments WHERE id = ?")
            .bind(parent_id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

        if parent_article != input.article_id {
            return Err(AppError::BadRequest(
                "Parent comment belongs to another article".to_string(),
            ));
        }
    }

    let is_admin = user.is_some_and(|user| user.is_admin);
    let approved = state.config.auto_approve || is_admin;

    let result = sqlx::query(
        r#"INSERT INTO comments
           (article_id, parent_id, content, author_name, author_email, author_url, user_id, approved, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(input.article_id)
    .bind(input.parent_id)
    .bind(&input.content)
    .bind(&input.author_name)
    .bind(&input.author_email)
    .bind(&input.author_url)
    .bind(user.map(|user| user.id))
    .bind(approved)
    .bind(Utc::now())
    .execute(&state.pool)
    .await?;

    let comment_id = result.last_insert_rowid();
    tracing::info!(
        comment_id,
        article_id = input.article_id,
        parent_id = ?input.parent_id,
        approved,
        "Comment created"
    );

    let comment = sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = ?"))
        .bind(comment_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(present(comment, true, &state.config.avatar_base_url))
}

/// Runs one moderation command against the stored row and returns the
/// resulting lifecycle. A row that is gone, before or during the write,
/// answers `NotFound`.
pub(crate) async fn apply_command(
    state: &AppState,
    comment_id: i64,
    command: ModerationCommand,
) -> AppResult<Lifecycle> {
    let current = sqlx::query_scalar::<_, bool>("SELECT approved FROM comments WHERE id = ?")
        .bind(comment_id)
        .fetch_optional(&state.pool)
        .await?
        .map_or(Lifecycle::Deleted, |approved| {
            Lifecycle::Live(ModerationState::from_approved(approved))
        });

    let next = current
        .transition(command)
        .map_err(|_| comment_not_found())?;

    let result = match next {
        Lifecycle::Live(moderation) => {
            sqlx::query("UPDATE comments SET approved = ? WHERE id = ?")
                .bind(moderation.is_approved())
                .bind(comment_id)
                .execute(&state.pool)
                .await?
        }
        // Replies keep their parent_id and are promoted to roots on the next fetch.
        Lifecycle::Deleted => {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(comment_id)
                .execute(&state.pool)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(comment_not_found());
    }
    Ok(next)
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(query) = query?;

    if query.admin {
        extract_admin_user(&state, &headers).await?;
    }
    ensure_article_exists(&state, query.article_id).await?;

    let comments = fetch_article_comments(&state, query.article_id, query.admin).await?;
    Ok(Json(build_tree(comments)))
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateComment>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let input = input.normalize()?;
    let user = extract_optional_user(&state, &headers).await?;

    let comment = insert_comment(&state, &input, user.as_ref()).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn moderate_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    headers: HeaderMap,
    payload: Result<Json<ModerationRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let admin = extract_admin_user(&state, &headers).await?;
    let Json(request) = payload?;

    let approved = match apply_command(&state, comment_id, ModerationCommand::Moderate(request.action)).await? {
        Lifecycle::Live(moderation) => moderation.is_approved(),
        Lifecycle::Deleted => return Err(comment_not_found()),
    };

    tracing::info!(
        comment_id,
        action = request.action.as_str(),
        moderator = %admin.username,
        "Comment moderated"
    );

    Ok(Json(ModerationOutcome {
        id: comment_id,
        approved,
    }))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let admin = extract_admin_user(&state, &headers).await?;

    apply_command(&state, comment_id, ModerationCommand::Delete).await?;
    tracing::info!(comment_id, moderator = %admin.username, "Comment deleted");

    Ok(Json(DeletionOutcome {
        id: comment_id,
        deleted: true,
    }))
}
