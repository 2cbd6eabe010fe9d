//! Spam health of a sender across every monitored mailbox.

use shared_types::{HealthMode, HealthStatus, HealthSummary, QueryResult};

use super::credentials::Credential;
use super::executor::{MailQueryExecutor, QueryError};
use crate::google::{Folder, MailQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Skip the remaining mailboxes once one has a match.
    pub stop_on_first_match: bool,
    pub max_results: u32,
}

impl AggregatorConfig {
    pub fn for_mode(mode: HealthMode, full_max_results: u32) -> Self {
        match mode {
            HealthMode::Quick => AggregatorConfig {
                stop_on_first_match: true,
                max_results: 1,
            },
            HealthMode::Full => AggregatorConfig {
                stop_on_first_match: false,
                max_results: full_max_results,
            },
        }
    }
}

pub struct Aggregator<'a> {
    executor: &'a MailQueryExecutor,
    config: AggregatorConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(executor: &'a MailQueryExecutor, config: AggregatorConfig) -> Self {
        Self { executor, config }
    }

    /// Count spam-folder messages from `sender` in each mailbox, one user at
    /// a time. Per-user failures become `unknown` results.
    pub async fn check_sender(&self, credentials: &[Credential], sender: &str) -> HealthSummary {
        let query = MailQuery::from_sender(sender, Folder::Spam, self.config.max_results);
        let mut results = Vec::with_capacity(credentials.len());
        let mut total_spam_count = 0;

        for (index, credential) in credentials.iter().enumerate() {
            let result = match self.executor.list(credential, &query).await {
                Ok(messages) => QueryResult::matched(&credential.email, messages.len() as u32),
                Err(QueryError::MissingAccessToken) => QueryResult::unknown(
                    &credential.email,
                    Some(QueryError::MissingAccessToken.to_string()),
                ),
                Err(e) => {
                    tracing::warn!("Spam check failed for {}: {}", credential.email, e);
                    QueryResult::unknown(&credential.email, Some(e.to_string()))
                }
            };

            let matches = result.match_count.unwrap_or(0);
            total_spam_count += matches;
            results.push(result);

            if self.config.stop_on_first_match && matches > 0 {
                results.extend(
                    credentials[index + 1..]
                        .iter()
                        .map(|skipped| QueryResult::unknown(&skipped.email, None)),
                );
                break;
            }
        }

        let status = if total_spam_count > 0 {
            HealthStatus::Bad
        } else {
            HealthStatus::Good
        };

        HealthSummary {
            status,
            total_users: credentials.len(),
            total_spam_count,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::google::MailError;
    use crate::mail::testing::{
        credential, executor, FakeIdentityProvider, FakeMailProvider, MemoryCredentialStore,
    };

    const SPAM_FROM_BOB: &str = "in:spam from:bob@example.com";

    fn three_users() -> Vec<Credential> {
        vec![
            credential("u1@example.com", Some("T-u1"), Some("R-u1")),
            credential("u2@example.com", Some("T-u2"), Some("R-u2")),
            credential("u3@example.com", Some("T-u3"), Some("R-u3")),
        ]
    }

    fn full() -> AggregatorConfig {
        AggregatorConfig::for_mode(HealthMode::Full, 100)
    }

    fn quick() -> AggregatorConfig {
        AggregatorConfig::for_mode(HealthMode::Quick, 100)
    }

    #[test]
    fn test_config_for_mode() {
        assert_eq!(
            quick(),
            AggregatorConfig {
                stop_on_first_match: true,
                max_results: 1
            }
        );
        assert_eq!(
            full(),
            AggregatorConfig {
                stop_on_first_match: false,
                max_results: 100
            }
        );
    }

    #[tokio::test]
    async fn test_no_matches_is_good() {
        let users = three_users();
        let mail = Arc::new(
            FakeMailProvider::new()
                .with_token("T-u1")
                .with_token("T-u2")
                .with_token("T-u3"),
        );
        let store = Arc::new(MemoryCredentialStore::new(users.clone()));
        let executor = executor(
            mail.clone(),
            Arc::new(FakeIdentityProvider::granting("T2")),
            store,
        );

        let summary = Aggregator::new(&executor, full())
            .check_sender(&users, "bob@example.com")
            .await;

        assert_eq!(summary.status, HealthStatus::Good);
        assert_eq!(summary.total_users, 3);
        assert_eq!(summary.total_spam_count, 0);
        assert!(summary
            .results
            .iter()
            .all(|r| r.status == HealthStatus::Good && r.match_count == Some(0)));
        assert_eq!(mail.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_remaining_users() {
        let users = three_users();
        let mail = Arc::new(
            FakeMailProvider::new()
                .with_token("T-u1")
                .with_listing("T-u2", SPAM_FROM_BOB, &["m1", "m2"])
                .with_token("T-u3"),
        );
        let store = Arc::new(MemoryCredentialStore::new(users.clone()));
        let executor = executor(
            mail.clone(),
            Arc::new(FakeIdentityProvider::granting("T2")),
            store,
        );
        let config = AggregatorConfig {
            stop_on_first_match: true,
            max_results: 10,
        };

        let summary = Aggregator::new(&executor, config)
            .check_sender(&users, "bob@example.com")
            .await;

        assert_eq!(summary.status, HealthStatus::Bad);
        assert_eq!(summary.total_users, 3);
        assert_eq!(summary.total_spam_count, 2);
        assert_eq!(summary.results[0], QueryResult::matched("u1@example.com", 0));
        assert_eq!(summary.results[1], QueryResult::matched("u2@example.com", 2));
        assert_eq!(summary.results[2], QueryResult::unknown("u3@example.com", None));
        assert!(!mail.calls().iter().any(|call| call.contains("T-u3")));
    }

    #[tokio::test]
    async fn test_full_scan_sums_matches() {
        let users = three_users();
        let mail = Arc::new(
            FakeMailProvider::new()
                .with_listing("T-u1", SPAM_FROM_BOB, &["a1"])
                .with_listing("T-u2", SPAM_FROM_BOB, &["b1", "b2"])
                .with_token("T-u3"),
        );
        let store = Arc::new(MemoryCredentialStore::new(users.clone()));
        let executor = executor(mail, Arc::new(FakeIdentityProvider::granting("T2")), store);

        let summary = Aggregator::new(&executor, full())
            .check_sender(&users, "bob@example.com")
            .await;

        assert_eq!(summary.status, HealthStatus::Bad);
        assert_eq!(summary.total_spam_count, 3);
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.results[2].status, HealthStatus::Good);
    }

    #[tokio::test]
    async fn test_user_failures_do_not_abort() {
        let users = vec![
            credential("new@example.com", None, None),
            credential("broken@example.com", Some("T-broken"), None),
            credential("ok@example.com", Some("T-ok"), None),
        ];
        let mail = Arc::new(
            FakeMailProvider::new()
                .with_failure("T-broken", MailError::Provider("503".to_string()))
                .with_listing("T-ok", SPAM_FROM_BOB, &["m1"]),
        );
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(users.clone()));
        let executor = executor(mail.clone(), identity.clone(), store);

        let summary = Aggregator::new(&executor, full())
            .check_sender(&users, "bob@example.com")
            .await;

        assert_eq!(summary.results[0].status, HealthStatus::Unknown);
        assert!(summary.results[0].error.is_some());
        assert_eq!(summary.results[1].status, HealthStatus::Unknown);
        assert_eq!(summary.results[2], QueryResult::matched("ok@example.com", 1));
        assert_eq!(summary.total_spam_count, 1);
        assert_eq!(summary.status, HealthStatus::Bad);
        // The user without an access token was never sent to the provider.
        assert_eq!(mail.calls().len(), 2);
        assert_eq!(identity.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_mid_scan() {
        let users = vec![credential("u1@example.com", Some("expired"), Some("R1"))];
        let mail = Arc::new(FakeMailProvider::new().with_listing("T2", SPAM_FROM_BOB, &[]));
        let identity = Arc::new(FakeIdentityProvider::granting("T2"));
        let store = Arc::new(MemoryCredentialStore::new(users.clone()));
        let executor = executor(mail, identity.clone(), store.clone());

        let summary = Aggregator::new(&executor, quick())
            .check_sender(&users, "bob@example.com")
            .await;

        assert_eq!(summary.status, HealthStatus::Good);
        assert_eq!(identity.refresh_calls(), 1);
        assert_eq!(
            store.get(users[0].user_id).unwrap().access_token.as_deref(),
            Some("T2")
        );
    }
}
