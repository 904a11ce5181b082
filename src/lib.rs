pub mod avatar;
pub mod client;
pub mod composer;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod moderation;
pub mod routes;
pub mod thread;
pub mod tree;

use std::sync::Arc;

use axum::{Router, response::IntoResponse, routing::get};
use sqlx::SqlitePool;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use routes::{auth_routes, comments_routes, pages_routes};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/comments", comments_routes())
        .nest("/articles", pages_routes())
        .route("/api/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({"status": "healthy"}))
}
