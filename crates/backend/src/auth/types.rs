//! Auth-related types and configuration.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export shared types for convenience
pub use shared_types::{AuthUserResponse, LoginInitResponse, LogoutResponse};

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    /// Database id of the user
    pub uid: Uuid,
    /// User display name from Google
    pub name: Option<String>,
    pub picture: Option<String>,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Validated user from JWT
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.uid,
            email: claims.sub,
            name: claims.name,
            picture: claims.picture,
        }
    }
}

impl From<AuthUser> for AuthUserResponse {
    fn from(user: AuthUser) -> Self {
        AuthUserResponse {
            user_id: user.user_id,
            email: user.email,
            name: user.name,
            picture: user.picture,
        }
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_duration_days: i64,
    pub cookie_name: String,
    /// Mark cookies `Secure` (production only)
    pub secure_cookies: bool,
}
