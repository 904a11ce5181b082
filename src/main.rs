use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use league_comments::{AppState, config::Config, create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "league_comments=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = db::init_db(&config.database_url, config.admin_username.as_deref()).await?;
    tracing::info!("Database initialized");

    let addr = config.bind_addr.clone();
    let app = create_app(AppState::new(pool, config));

    tracing::info!("Server running on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
