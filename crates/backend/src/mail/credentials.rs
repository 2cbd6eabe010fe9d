//! Per-user OAuth credentials and the store they live in.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{self, DbPool};

/// Users carrying this tag are operators, not monitored mailboxes.
pub const ADMIN_TAG: &str = "admin";

/// OAuth tokens of one onboarded user.
///
/// `access_token` is `None` for users who never completed onboarding, and
/// may be stale (rejected by the provider) when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Which users a credential listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxScope {
    /// Every user not tagged [`ADMIN_TAG`]
    Monitored,
    /// Every user holding an access token
    Authenticated,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials in onboarding order.
    async fn list(&self, scope: MailboxScope) -> anyhow::Result<Vec<Credential>>;

    /// Persist a new access token, and the refresh token when it was rotated.
    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Credential store backed by the `users` table
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: DbPool,
}

impl PgCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn list(&self, scope: MailboxScope) -> anyhow::Result<Vec<Credential>> {
        let mut conn = db::get_conn(&self.pool).await?;

        let users = match scope {
            MailboxScope::Monitored => db::users::list_without_tag(&mut conn, ADMIN_TAG).await?,
            MailboxScope::Authenticated => db::users::list_with_access_token(&mut conn).await?,
        };

        Ok(users.into_iter().map(Credential::from).collect())
    }

    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut conn = db::get_conn(&self.pool).await?;
        db::users::update_tokens(&mut conn, user_id, access_token, refresh_token).await
    }
}
