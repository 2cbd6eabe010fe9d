use spamwatch_backend::{build_router, config::AppConfig, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("spamwatch_backend=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr;
    tracing::info!(
        "Using {:?} cache, Gmail API at {}",
        config.cache_backend,
        config.gmail_api_base
    );

    let state = AppState::from_config(config)?;
    let app = build_router(state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
