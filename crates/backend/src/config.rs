use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::types::AuthConfig;
use crate::google::{gmail, oauth, GoogleOAuthConfig};

/// Where cached values live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub google: GoogleOAuthConfig,
    pub gmail_api_base: String,
    pub jwt_secret: String,
    pub session_duration_days: i64,
    pub session_cookie_name: String,
    pub secure_cookies: bool,
    pub cache_backend: CacheBackend,
    /// `None` disables caching of health verdicts
    pub health_cache_ttl: Option<Duration>,
    pub health_full_max_results: u32,
    pub search_max_results: u32,
    pub cors_allowed_origins: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let cache_backend = match or_default("CACHE_BACKEND", "memory").as_str() {
            "memory" => CacheBackend::Memory,
            "postgres" => CacheBackend::Postgres,
            other => bail!("CACHE_BACKEND must be 'memory' or 'postgres', got '{}'", other),
        };

        let health_cache_ttl_secs: u64 = or_default("HEALTH_CACHE_TTL_SECS", "300")
            .parse()
            .context("HEALTH_CACHE_TTL_SECS must be a valid number")?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:3000")
                .parse()
                .context("BIND_ADDR must be a socket address")?,
            google: GoogleOAuthConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri: required("GOOGLE_REDIRECT_URI")?,
                auth_url: or_default("GOOGLE_AUTH_URL", oauth::DEFAULT_AUTH_URL),
                token_url: or_default("GOOGLE_TOKEN_URL", oauth::DEFAULT_TOKEN_URL),
                userinfo_url: or_default("GOOGLE_USERINFO_URL", oauth::DEFAULT_USERINFO_URL),
            },
            gmail_api_base: or_default("GMAIL_API_BASE", gmail::DEFAULT_API_BASE),
            jwt_secret: required("JWT_SECRET")?,
            session_duration_days: or_default("SESSION_DURATION_DAYS", "7")
                .parse()
                .context("SESSION_DURATION_DAYS must be a valid number")?,
            session_cookie_name: or_default("SESSION_COOKIE_NAME", "session"),
            secure_cookies: or_default("RUST_ENV", "development") == "production",
            cache_backend,
            health_cache_ttl: (health_cache_ttl_secs > 0)
                .then(|| Duration::from_secs(health_cache_ttl_secs)),
            health_full_max_results: or_default("HEALTH_FULL_MAX_RESULTS", "100")
                .parse()
                .context("HEALTH_FULL_MAX_RESULTS must be a valid number")?,
            search_max_results: or_default("SEARCH_MAX_RESULTS", "200")
                .parse()
                .context("SEARCH_MAX_RESULTS must be a valid number")?,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS"),
        })
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            jwt_secret: self.jwt_secret.clone(),
            token_duration_days: self.session_duration_days,
            cookie_name: self.session_cookie_name.clone(),
            secure_cookies: self.secure_cookies,
        }
    }
}
