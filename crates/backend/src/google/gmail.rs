//! Gmail REST client for listing and reading messages with a bearer token.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";

/// Failure of a single call to the mail provider, classified once at the
/// HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The access token was rejected (HTTP 401); recoverable by a refresh.
    #[error("authorization expired: {0}")]
    AuthExpired(String),

    #[error("mail provider error: {0}")]
    Provider(String),

    #[error("message not found: {0}")]
    NotFound(String),
}

/// Folder restriction applied to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Spam,
    NotSpam,
    Any,
}

/// A mailbox search: free-form Gmail query, folder filter and result cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub query: String,
    pub folder: Folder,
    pub max_results: u32,
}

impl MailQuery {
    /// Messages sent by `sender` within `folder`.
    pub fn from_sender(sender: &str, folder: Folder, max_results: u32) -> Self {
        MailQuery {
            query: format!("from:{}", sender),
            folder,
            max_results,
        }
    }

    /// Render as a Gmail `q` parameter.
    pub fn search_string(&self) -> String {
        match self.folder {
            Folder::Spam => format!("in:spam {}", self.query),
            Folder::NotSpam => format!("-in:spam {}", self.query),
            Folder::Any => self.query.clone(),
        }
    }
}

/// Entry of a message listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: String,
}

/// Message metadata fetched from Gmail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub received_at: Option<DateTime<Utc>>,
    pub label_ids: Vec<String>,
}

/// Remote mailbox operations, authenticated by a bearer access token.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &MailQuery,
    ) -> Result<Vec<MessageRef>, MailError>;

    async fn get_message(&self, access_token: &str, id: &str) -> Result<MessageDetail, MailError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    internal_date: Option<String>,
    payload: Option<RawPayload>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    headers: Vec<RawHeader>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    name: String,
    value: String,
}

/// Client for the Gmail REST API
pub struct GmailClient {
    client: Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.base_url)
    }

    async fn check(response: Response) -> Result<Response, MailError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED => MailError::AuthExpired(body),
            StatusCode::NOT_FOUND => MailError::NotFound(body),
            _ => MailError::Provider(format!("{}: {}", status, body)),
        })
    }

    fn parse_message(message: RawMessage) -> MessageDetail {
        let mut subject = String::new();
        let mut from = String::new();
        let mut received_at = None;

        if let Some(payload) = &message.payload {
            for header in &payload.headers {
                match header.name.as_str() {
                    "Subject" => subject = header.value.clone(),
                    "From" => from = header.value.clone(),
                    "Date" => received_at = Self::parse_date(&header.value),
                    _ => {}
                }
            }
        }

        if received_at.is_none() {
            received_at = message
                .internal_date
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        }

        MessageDetail {
            id: message.id,
            thread_id: message.thread_id,
            subject,
            from,
            snippet: message.snippet,
            received_at,
            label_ids: message.label_ids,
        }
    }

    fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc2822(date_str)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        access_token: &str,
        query: &MailQuery,
    ) -> Result<Vec<MessageRef>, MailError> {
        let max_results = query.max_results.to_string();
        let response = self
            .client
            .get(self.messages_url())
            .bearer_auth(access_token)
            .query(&[
                ("q", query.search_string().as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MailError::Provider(format!("list request failed: {}", e)))?;

        let list: ListResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Provider(format!("invalid list response: {}", e)))?;

        Ok(list.messages)
    }

    async fn get_message(&self, access_token: &str, id: &str) -> Result<MessageDetail, MailError> {
        let response = self
            .client
            .get(format!("{}/{}", self.messages_url(), id))
            .bearer_auth(access_token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "Subject"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Date"),
            ])
            .send()
            .await
            .map_err(|e| MailError::Provider(format!("get request failed: {}", e)))?;

        let message: RawMessage = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Provider(format!("invalid message response: {}", e)))?;

        Ok(Self::parse_message(message))
    }
}
