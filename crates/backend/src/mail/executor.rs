//! Runs mailbox calls with the stored access token, refreshing it once on 401.
//!
//! Per call: first attempt with the current token. If the provider answers
//! [`MailError::AuthExpired`] and the user has a refresh token, the token is
//! refreshed and the identical call is retried exactly once. A [`Mailbox`]
//! refreshes at most once over its lifetime, so a second 401 after a refresh
//! is terminal.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use super::credentials::Credential;
use super::refresher::{RefreshError, TokenRefresher};
use crate::google::{MailError, MailProvider, MailQuery, MessageDetail, MessageRef};

/// Terminal per-user failure of a mailbox operation
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no access token on record")]
    MissingAccessToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] RefreshError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

pub struct MailQueryExecutor {
    mail: Arc<dyn MailProvider>,
    refresher: TokenRefresher,
}

impl MailQueryExecutor {
    pub fn new(mail: Arc<dyn MailProvider>, refresher: TokenRefresher) -> Self {
        Self { mail, refresher }
    }

    /// Start a sequence of calls against one user's mailbox.
    pub fn open(&self, credential: Credential) -> Mailbox<'_> {
        Mailbox {
            executor: self,
            credential,
            refreshed: false,
        }
    }

    /// List the messages matching `query` in a single mailbox.
    pub async fn list(
        &self,
        credential: &Credential,
        query: &MailQuery,
    ) -> Result<Vec<MessageRef>, QueryError> {
        self.open(credential.clone()).list(query).await
    }
}

/// One user's mailbox for the duration of an operation.
pub struct Mailbox<'a> {
    executor: &'a MailQueryExecutor,
    credential: Credential,
    refreshed: bool,
}

impl<'a> Mailbox<'a> {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn refreshed(&self) -> bool {
        self.refreshed
    }

    pub async fn list(&mut self, query: &MailQuery) -> Result<Vec<MessageRef>, QueryError> {
        let executor: &'a MailQueryExecutor = self.executor;
        let mail = executor.mail.as_ref();
        self.call(move |token| async move { mail.list_messages(&token, query).await })
            .await
    }

    pub async fn get(&mut self, id: &str) -> Result<MessageDetail, QueryError> {
        let executor: &'a MailQueryExecutor = self.executor;
        let mail = executor.mail.as_ref();
        self.call(move |token| async move { mail.get_message(&token, id).await })
            .await
    }

    async fn call<T, F, Fut>(&mut self, attempt: F) -> Result<T, QueryError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, MailError>>,
    {
        let token = self
            .credential
            .access_token
            .clone()
            .ok_or(QueryError::MissingAccessToken)?;

        let detail = match attempt(token).await {
            Err(MailError::AuthExpired(detail)) => detail,
            other => return other.map_err(QueryError::Mail),
        };

        let refresh_token = match (&self.credential.refresh_token, self.refreshed) {
            (Some(refresh_token), false) => refresh_token.clone(),
            _ => return Err(QueryError::Mail(MailError::AuthExpired(detail))),
        };

        tracing::info!(
            "Access token for {} was rejected, refreshing",
            self.credential.email
        );
        self.refreshed = true;

        let fresh = self
            .executor
            .refresher
            .refresh(self.credential.user_id, &refresh_token)
            .await
            .map_err(QueryError::RefreshFailed)?;
        self.credential.access_token = Some(fresh.clone());

        attempt(fresh).await.map_err(QueryError::Mail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::Folder;
    use crate::mail::testing::{
        credential, executor, FakeIdentityProvider, FakeMailProvider, MemoryCredentialStore,
    };

    fn spam_from_bob() -> MailQuery {
        MailQuery::from_sender("bob@example.com", Folder::Spam, 10)
    }

    #[tokio::test]
    async fn test_valid_token_never_refreshes() {
        let user = credential("alice@example.com", Some("T1"), Some("R1"));
        let mail = Arc::new(FakeMailProvider::new().with_listing(
            "T1",
            "in:spam from:bob@example.com",
            &["m1", "m2"],
        ));
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store.clone());

        let messages = executor.list(&user, &spam_from_bob()).await.unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(identity.refresh_calls(), 0);
        assert_eq!(mail.calls(), vec!["list T1 in:spam from:bob@example.com"]);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_access_token_skips_remote_call() {
        let user = credential("alice@example.com", None, Some("R1"));
        let mail = Arc::new(FakeMailProvider::new());
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let err = executor.list(&user, &spam_from_bob()).await.unwrap_err();

        assert!(matches!(err, QueryError::MissingAccessToken));
        assert!(mail.calls().is_empty());
        assert_eq!(identity.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_retries_once() {
        let user = credential("alice@example.com", Some("expired"), Some("R1"));
        let mail = Arc::new(FakeMailProvider::new().with_listing(
            "T2",
            "in:spam from:bob@example.com",
            &["m1"],
        ));
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store.clone());

        let messages = executor.list(&user, &spam_from_bob()).await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(identity.refresh_calls(), 1);
        assert_eq!(
            mail.calls(),
            vec![
                "list expired in:spam from:bob@example.com",
                "list T2 in:spam from:bob@example.com",
            ]
        );
        let stored = store.get(user.user_id).unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("T2"));
    }

    #[tokio::test]
    async fn test_second_auth_failure_is_terminal() {
        let user = credential("alice@example.com", Some("expired"), Some("R1"));
        // T2 is not a valid token for the fake provider either.
        let mail = Arc::new(FakeMailProvider::new());
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let err = executor.list(&user, &spam_from_bob()).await.unwrap_err();

        assert!(matches!(err, QueryError::Mail(MailError::AuthExpired(_))));
        assert_eq!(identity.refresh_calls(), 1);
        assert_eq!(mail.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_without_refresh_token() {
        let user = credential("alice@example.com", Some("expired"), None);
        let mail = Arc::new(FakeMailProvider::new());
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let err = executor.list(&user, &spam_from_bob()).await.unwrap_err();

        assert!(matches!(err, QueryError::Mail(MailError::AuthExpired(_))));
        assert_eq!(identity.refresh_calls(), 0);
        assert_eq!(mail.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_retry() {
        let user = credential("alice@example.com", Some("expired"), Some("revoked"));
        let mail = Arc::new(FakeMailProvider::new());
        let identity = Arc::new(FakeIdentityProvider::revoked());
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let err = executor.list(&user, &spam_from_bob()).await.unwrap_err();

        assert!(matches!(err, QueryError::RefreshFailed(_)));
        assert_eq!(identity.refresh_calls(), 1);
        assert_eq!(mail.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let user = credential("alice@example.com", Some("T1"), Some("R1"));
        let mail = Arc::new(
            FakeMailProvider::new().with_failure("T1", MailError::Provider("500".to_string())),
        );
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let err = executor.list(&user, &spam_from_bob()).await.unwrap_err();

        assert!(matches!(err, QueryError::Mail(MailError::Provider(_))));
        assert_eq!(identity.refresh_calls(), 0);
        assert_eq!(mail.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mailbox_reuses_refreshed_token() {
        let user = credential("alice@example.com", Some("expired"), Some("R1"));
        let mail = Arc::new(FakeMailProvider::new().with_listing(
            "T2",
            "in:spam from:bob@example.com",
            &["m1"],
        ));
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let mut mailbox = executor.open(user);
        let messages = mailbox.list(&spam_from_bob()).await.unwrap();
        let detail = mailbox.get(&messages[0].id).await.unwrap();

        assert!(mailbox.refreshed());
        assert_eq!(mailbox.credential().access_token.as_deref(), Some("T2"));
        assert_eq!(detail.id, "m1");
        assert_eq!(identity.refresh_calls(), 1);
        assert_eq!(mail.calls().last().map(String::as_str), Some("get T2 m1"));
    }

    #[tokio::test]
    async fn test_mailbox_refreshes_at_most_once() {
        let user = credential("alice@example.com", Some("expired"), Some("R1"));
        let mail = Arc::new(FakeMailProvider::new().with_listing(
            "T2",
            "in:spam from:bob@example.com",
            &["m1"],
        ));
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(vec![user.clone()]));
        let executor = executor(mail.clone(), identity.clone(), store);

        let mut mailbox = executor.open(user);
        mailbox.list(&spam_from_bob()).await.unwrap();
        mail.revoke("T2");
        let err = mailbox.get("m1").await.unwrap_err();

        assert!(matches!(err, QueryError::Mail(MailError::AuthExpired(_))));
        assert_eq!(identity.refresh_calls(), 1);
    }
}
