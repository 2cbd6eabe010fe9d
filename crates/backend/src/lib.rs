//! Spam health dashboard backend: onboards Gmail users through Google OAuth
//! and checks where a sender's mail lands across their mailboxes.

use std::sync::Arc;

use axum::{
    http::{header, Method, StatusCode},
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod google;
mod handlers;
pub mod mail;
pub mod models;
pub mod schema;

use auth::types::AuthConfig;
use cache::{Cache, MemoryCache, PgCache};
use config::{AppConfig, CacheBackend};
use db::DbPool;
use google::{GmailClient, GoogleOAuthClient, IdentityProvider, MailProvider};
use mail::{CredentialStore, MailQueryExecutor, PgCredentialStore, TokenRefresher};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<AppConfig>,
    pub auth_config: AuthConfig,
    pub identity: Arc<dyn IdentityProvider>,
    pub credentials: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn Cache>,
    pub executor: Arc<MailQueryExecutor>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: DbPool,
        identity: Arc<dyn IdentityProvider>,
        mail: Arc<dyn MailProvider>,
        credentials: Arc<dyn CredentialStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let refresher = TokenRefresher::new(identity.clone(), credentials.clone());
        let executor = Arc::new(MailQueryExecutor::new(mail, refresher));

        Self {
            auth_config: config.auth_config(),
            config: Arc::new(config),
            pool,
            identity,
            credentials,
            cache,
            executor,
        }
    }

    /// Wire the Google clients and Postgres-backed stores.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::establish_connection_pool(&config.database_url)?;

        let identity = Arc::new(GoogleOAuthClient::new(config.google.clone()));
        let mail = Arc::new(GmailClient::new(config.gmail_api_base.clone()));
        let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
        let cache: Arc<dyn Cache> = match config.cache_backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::Postgres => Arc::new(PgCache::new(pool.clone())),
        };

        Ok(Self::new(config, pool, identity, mail, credentials, cache))
    }
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth", get(auth::auth_login))
        .route("/api/auth/google", get(auth::auth_google))
        .route("/api/auth/callback", get(auth::auth_callback))
        .route(
            "/api/auth/logout",
            get(auth::auth_logout).post(auth::auth_logout),
        );

    let protected = Router::new()
        .route("/api/auth/me", get(auth::auth_me))
        // Mailbox routes
        .route("/api/emails/list", get(handlers::list_emails))
        .route("/api/emails/health", get(handlers::email_health))
        .route("/api/emails/search", get(handlers::search_emails))
        // User routes
        .route("/api/users", get(handlers::list_users))
        .route(
            "/api/users/:id/tags",
            get(handlers::get_user_tags)
                .post(handlers::add_user_tag)
                .delete(handlers::remove_user_tag),
        )
        // Tag routes
        .route("/api/tags", get(handlers::list_tags).post(handlers::create_tag))
        .route("/api/tags/:id", delete(handlers::delete_tag))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let cors = build_cors_layer(state.config.cors_allowed_origins.as_deref());

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Build CORS layer from the configured origin list.
///
/// If origins are given, only those are allowed with credentials.
/// Otherwise defaults to permissive CORS (for development only).
fn build_cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                    .allow_credentials(true)
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
