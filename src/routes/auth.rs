use axum::{
    Router,
    extract::{Json, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    },
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{CreateUser, LoginUser, TokenResponse, User, UserResponse};

pub const SESSION_COOKIE: &str = "access_token";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(get_me))
}

// ============================
// Standard Auth
// ============================

async fn register(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> AppResult<impl IntoResponse> {
    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ? OR email = ?")
        .bind(&input.username)
        .bind(&input.email)
        .fetch_optional(&state.pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest(
            "Username or email already registered".to_string(),
        ));
    }

    let hashed = hash(&input.password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let display_name = input.display_name.unwrap_or_else(|| input.username.clone());
    let now = Utc::now();

    let result = sqlx::query(
        r#"INSERT INTO users (username, email, hashed_password, display_name, is_admin, created_at)
           VALUES (?, ?, ?, ?, 0, ?)"#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&hashed)
    .bind(&display_name)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&state.pool)
        .await?;

    tracing::info!("Registered user {}", user.username);
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

async fn login(
    State(state): State<AppState>,
    axum::Form(input): axum::Form<LoginUser>,
) -> AppResult<impl IntoResponse> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(&input.username)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Incorrect username or password".to_string()))?;

    let hashed = user
        .hashed_password
        .as_ref()
        .ok_or_else(|| AppError::Unauthorized("Incorrect username or password".to_string()))?;

    let valid = verify(&input.password, hashed).map_err(|e| AppError::Internal(e.to_string()))?;
    if !valid {
        return Err(AppError::Unauthorized(
            "Incorrect username or password".to_string(),
        ));
    }

    let token = generate_jwt(&state.config, &user.username)?;
    let session_cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400");

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie)]),
        Json(TokenResponse {
            access_token: token,
            token_type: "bearer".to_string(),
        }),
    ))
}

async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let user = extract_current_user(&state, &headers).await?;
    Ok(Json(UserResponse::from(user)))
}

// ============================
// Helper: Credentials
// ============================

/// Bearer token from `Authorization`, else the session cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(ToString::to_string);

    bearer.or_else(|| {
        headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| extract_cookie_value(cookies, SESSION_COOKIE))
    })
}

fn extract_cookie_value(cookie_header: &str, key: &str) -> Option<String> {
    cookie_header
        .split(';')
        .find_map(|cookie| {
            let cookie = cookie.trim();
            cookie.strip_prefix(&format!("{}=", key))
        })
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

async fn user_for_token(state: &AppState, token: &str) -> AppResult<Option<User>> {
    let token_data = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.secret_key.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data,
        Err(_) => return Ok(None),
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(&token_data.claims.sub)
        .fetch_optional(&state.pool)
        .await?;

    Ok(user)
}

pub async fn extract_current_user(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let token = session_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing credentials".to_string()))?;

    user_for_token(state, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
}

/// Like `extract_current_user`, but anonymous callers are fine.
pub async fn extract_optional_user(state: &AppState, headers: &HeaderMap) -> AppResult<Option<User>> {
    let Some(token) = session_token(headers) else {
        return Ok(None);
    };
    user_for_token(state, &token).await
}

pub async fn extract_admin_user(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let user = extract_current_user(state, headers).await?;
    if !user.is_admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(user)
}

// ============================
// Helper: JWT Generation
// ============================

pub fn generate_jwt(config: &Config, username: &str) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .ok_or_else(|| AppError::Internal("token expiry overflow".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: username.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}
