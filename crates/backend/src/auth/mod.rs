//! Authentication module for JWT session cookies with Google OAuth login.
//!
//! This module provides:
//! - JWT token creation and validation
//! - Google OAuth onboarding, which also stores the user's mailbox tokens
//! - `require_auth` middleware for protecting routes

mod handlers;
pub(crate) mod jwt;
mod middleware;
pub mod types;

pub use handlers::{auth_callback, auth_google, auth_login, auth_logout, auth_me};
pub use middleware::{build_auth_cookie, build_logout_cookie, extract_auth_user, require_auth};
