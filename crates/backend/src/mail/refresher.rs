//! Exchanges refresh tokens for new access tokens and writes them back.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::credentials::CredentialStore;
use crate::google::{IdentityProvider, OAuthError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("identity provider refused refresh: {0}")]
    Provider(#[from] OAuthError),

    #[error("failed to persist refreshed token: {0}")]
    Persist(anyhow::Error),
}

pub struct TokenRefresher {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn CredentialStore>,
}

impl TokenRefresher {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn CredentialStore>) -> Self {
        Self { identity, store }
    }

    /// Mint a new access token for `user_id` and store it before returning.
    ///
    /// A rotated refresh token is stored too. Any failure is final for the
    /// current operation.
    pub async fn refresh(&self, user_id: Uuid, refresh_token: &str) -> Result<String, RefreshError> {
        let grant = self.identity.refresh_access_token(refresh_token).await?;

        self.store
            .update_tokens(user_id, &grant.access_token, grant.refresh_token.as_deref())
            .await
            .map_err(RefreshError::Persist)?;

        tracing::info!(
            "Refreshed access token for user {} (refresh token rotated: {})",
            user_id,
            grant.refresh_token.is_some()
        );

        Ok(grant.access_token)
    }
}
