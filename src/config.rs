use anyhow::Context;

use crate::thread::DEFAULT_MAX_DEPTH;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub secret_key: String,
    /// New comments from non-admins are approved immediately when set.
    pub auto_approve: bool,
    pub max_reply_depth: usize,
    pub avatar_base_url: String,
    pub admin_username: Option<String>,
}

impl Config {
    pub fn new(database_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            bind_addr: "0.0.0.0:8000".to_string(),
            secret_key: secret_key.into(),
            auto_approve: false,
            max_reply_depth: DEFAULT_MAX_DEPTH,
            avatar_base_url: "https://www.gravatar.com/avatar".to_string(),
            admin_username: None,
        }
    }

    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = std::env::var("SECRET_KEY").context("SECRET_KEY must be set in .env")?;
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://league_comments.db".to_string());

        let mut config = Self::new(database_url, secret_key);

        if let Ok(bind_addr) = std::env::var("BIND_ADDR") {
            config.bind_addr = bind_addr;
        }
        if let Ok(raw) = std::env::var("COMMENTS_AUTO_APPROVE") {
            config.auto_approve = parse_flag(&raw)
                .with_context(|| format!("COMMENTS_AUTO_APPROVE must be true or false, got {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("COMMENTS_MAX_DEPTH") {
            config.max_reply_depth = raw
                .trim()
                .parse()
                .with_context(|| format!("COMMENTS_MAX_DEPTH must be a number, got {raw:?}"))?;
        }
        if let Ok(avatar_base_url) = std::env::var("AVATAR_BASE_URL") {
            config.avatar_base_url = avatar_base_url;
        }
        config.admin_username = std::env::var("ADMIN_USERNAME")
            .ok()
            .filter(|name| !name.trim().is_empty());

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
