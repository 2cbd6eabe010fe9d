use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Tags and users
// ============================================================================

/// Tag struct matching database column order exactly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Body for attaching or detaching a tag on a user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTagRequest {
    pub tag_id: Uuid,
}

/// Onboarded user as exposed by the API.
///
/// OAuth tokens never leave the server; only their presence is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailListResponse {
    pub emails: Vec<String>,
}

// ============================================================================
// Spam health
// ============================================================================

/// Mailbox health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Good,
    Bad,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Good => "good",
            HealthStatus::Bad => "bad",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// How the health aggregate scans the onboarded mailboxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthMode {
    /// Stop at the first mailbox with a match, answer with `{health}` only
    #[default]
    Quick,
    /// Query every mailbox and report per-user results
    Full,
}

impl HealthMode {
    pub fn as_str(&self) -> &str {
        match self {
            HealthMode::Quick => "quick",
            HealthMode::Full => "full",
        }
    }
}

impl FromStr for HealthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(HealthMode::Quick),
            "full" => Ok(HealthMode::Full),
            other => Err(format!("unknown health mode '{}'", other)),
        }
    }
}

/// Outcome of querying a single mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub user_email: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn matched(user_email: impl Into<String>, match_count: u32) -> Self {
        let status = if match_count > 0 {
            HealthStatus::Bad
        } else {
            HealthStatus::Good
        };
        QueryResult {
            user_email: user_email.into(),
            status,
            match_count: Some(match_count),
            error: None,
        }
    }

    pub fn unknown(user_email: impl Into<String>, error: Option<String>) -> Self {
        QueryResult {
            user_email: user_email.into(),
            status: HealthStatus::Unknown,
            match_count: None,
            error,
        }
    }
}

/// Aggregate spam health across all checked mailboxes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub total_users: usize,
    pub total_spam_count: u32,
    pub results: Vec<QueryResult>,
}

impl HealthSummary {
    /// True when some mailbox could not be checked. Mailboxes skipped after
    /// an early match carry no error and do not count.
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == HealthStatus::Unknown && r.error.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickHealthResponse {
    pub health: HealthStatus,
}

/// Body of `GET /api/emails/health`; the shape depends on the requested mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthResponse {
    Full(HealthSummary),
    Quick(QuickHealthResponse),
}

impl HealthResponse {
    pub fn for_mode(mode: HealthMode, summary: HealthSummary) -> Self {
        match mode {
            HealthMode::Quick => HealthResponse::Quick(QuickHealthResponse {
                health: summary.status,
            }),
            HealthMode::Full => HealthResponse::Full(summary),
        }
    }

    pub fn status(&self) -> HealthStatus {
        match self {
            HealthResponse::Full(summary) => summary.status,
            HealthResponse::Quick(quick) => quick.health,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Folder a search hit was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLocation {
    Spam,
    Inbox,
}

impl MessageLocation {
    pub fn as_str(&self) -> &str {
        match self {
            MessageLocation::Spam => "spam",
            MessageLocation::Inbox => "inbox",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMessage {
    pub id: String,
    pub thread_id: String,
    pub user_email: String,
    pub location: MessageLocation,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub received_at: Option<DateTime<Utc>>,
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub messages: Vec<SearchMessage>,
}

// ============================================================================
// Auth
// ============================================================================

/// Response from auth/google endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInitResponse {
    pub auth_url: String,
}

/// Response from auth/me endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub success: bool,
}
