//! In-memory stand-ins for the mail provider, identity provider and
//! credential store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::credentials::{Credential, CredentialStore, MailboxScope};
use super::executor::MailQueryExecutor;
use super::refresher::TokenRefresher;
use crate::google::{
    GoogleUserInfo, IdentityProvider, MailError, MailProvider, MailQuery, MessageDetail,
    MessageRef, OAuthError, TokenGrant,
};

pub fn credential(email: &str, access_token: Option<&str>, refresh_token: Option<&str>) -> Credential {
    Credential {
        user_id: Uuid::new_v4(),
        email: email.to_string(),
        access_token: access_token.map(str::to_string),
        refresh_token: refresh_token.map(str::to_string),
    }
}

pub fn executor(
    mail: Arc<FakeMailProvider>,
    identity: Arc<FakeIdentityProvider>,
    store: Arc<MemoryCredentialStore>,
) -> MailQueryExecutor {
    MailQueryExecutor::new(mail, TokenRefresher::new(identity, store))
}

#[derive(Default)]
struct MailState {
    valid: HashSet<String>,
    listings: HashMap<(String, String), Vec<MessageRef>>,
    failures: HashMap<String, MailError>,
    missing: HashSet<String>,
    calls: Vec<String>,
    list_limits: Vec<u32>,
}

/// Mail provider that accepts only registered tokens and answers from
/// canned listings keyed by `(token, search string)`.
#[derive(Default)]
pub struct FakeMailProvider {
    state: Mutex<MailState>,
}

impl FakeMailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str) -> Self {
        self.state.lock().unwrap().valid.insert(token.to_string());
        self
    }

    pub fn with_listing(self, token: &str, search: &str, ids: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.valid.insert(token.to_string());
            state.listings.insert(
                (token.to_string(), search.to_string()),
                ids.iter()
                    .map(|id| MessageRef {
                        id: id.to_string(),
                        thread_id: format!("thread-{}", id),
                    })
                    .collect(),
            );
        }
        self
    }

    pub fn with_failure(self, token: &str, error: MailError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(token.to_string(), error);
        self
    }

    pub fn with_missing_message(self, id: &str) -> Self {
        self.state.lock().unwrap().missing.insert(id.to_string());
        self
    }

    pub fn revoke(&self, token: &str) {
        self.state.lock().unwrap().valid.remove(token);
    }

    /// Calls seen so far, as `"list <token> <q>"` or `"get <token> <id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// `max_results` of every list call, in call order.
    pub fn list_limits(&self) -> Vec<u32> {
        self.state.lock().unwrap().list_limits.clone()
    }

    fn authorize(state: &MailState, token: &str) -> Result<(), MailError> {
        if let Some(error) = state.failures.get(token) {
            return Err(error.clone());
        }
        if !state.valid.contains(token) {
            return Err(MailError::AuthExpired("invalid credentials".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MailProvider for FakeMailProvider {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &MailQuery,
    ) -> Result<Vec<MessageRef>, MailError> {
        let mut state = self.state.lock().unwrap();
        let search = query.search_string();
        state.calls.push(format!("list {} {}", access_token, search));
        state.list_limits.push(query.max_results);
        Self::authorize(&state, access_token)?;

        let mut messages = state
            .listings
            .get(&(access_token.to_string(), search))
            .cloned()
            .unwrap_or_default();
        messages.truncate(query.max_results as usize);
        Ok(messages)
    }

    async fn get_message(&self, access_token: &str, id: &str) -> Result<MessageDetail, MailError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {} {}", access_token, id));
        Self::authorize(&state, access_token)?;

        if state.missing.contains(id) {
            return Err(MailError::NotFound(id.to_string()));
        }

        Ok(MessageDetail {
            id: id.to_string(),
            thread_id: format!("thread-{}", id),
            subject: format!("Subject {}", id),
            from: "bob@example.com".to_string(),
            snippet: String::new(),
            received_at: None,
            label_ids: vec![],
        })
    }
}

/// Identity provider that grants a fixed token, or refuses every refresh.
pub struct FakeIdentityProvider {
    access_token: Option<String>,
    rotated_refresh_token: Option<String>,
    refresh_calls: AtomicUsize,
}

impl FakeIdentityProvider {
    pub fn granting(access_token: &str) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            rotated_refresh_token: None,
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn revoked() -> Self {
        Self {
            access_token: None,
            rotated_refresh_token: None,
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn rotating(mut self, refresh_token: &str) -> Self {
        self.rotated_refresh_token = Some(refresh_token.to_string());
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn invalid_grant() -> OAuthError {
        OAuthError::Rejected {
            status: 400,
            body: "{\"error\":\"invalid_grant\"}".to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, OAuthError> {
        Err(Self::invalid_grant())
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.access_token {
            Some(token) => Ok(TokenGrant {
                access_token: token.clone(),
                refresh_token: self.rotated_refresh_token.clone(),
                expires_in: Some(3599),
            }),
            None => Err(Self::invalid_grant()),
        }
    }

    async fn user_info(&self, _access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
        Err(Self::invalid_grant())
    }
}

/// Credential store over a vector, remembering which users are admins.
pub struct MemoryCredentialStore {
    entries: Mutex<Vec<(Credential, bool)>>,
    updates: AtomicUsize,
    fail_updates: bool,
}

impl MemoryCredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            entries: Mutex::new(credentials.into_iter().map(|c| (c, false)).collect()),
            updates: AtomicUsize::new(0),
            fail_updates: false,
        }
    }

    pub fn with_admin(self, credential: Credential) -> Self {
        self.entries.lock().unwrap().push((credential, true));
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn get(&self, user_id: Uuid) -> Option<Credential> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.user_id == user_id)
            .map(|(c, _)| c.clone())
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn list(&self, scope: MailboxScope) -> anyhow::Result<Vec<Credential>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|(c, admin)| match scope {
                MailboxScope::Monitored => !admin,
                MailboxScope::Authenticated => c.access_token.is_some(),
            })
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn update_tokens(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()> {
        if self.fail_updates {
            anyhow::bail!("database unavailable");
        }

        let mut entries = self.entries.lock().unwrap();
        let (credential, _) = entries
            .iter_mut()
            .find(|(c, _)| c.user_id == user_id)
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user_id))?;

        credential.access_token = Some(access_token.to_string());
        if let Some(refresh_token) = refresh_token {
            credential.refresh_token = Some(refresh_token.to_string());
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
