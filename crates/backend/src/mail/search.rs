//! Search every authenticated mailbox for messages from a sender.

use shared_types::{MessageLocation, SearchMessage};

use super::credentials::Credential;
use super::executor::{Mailbox, MailQueryExecutor, QueryError};
use crate::google::{Folder, MailError, MailQuery, MessageDetail};

pub struct MailSearch<'a> {
    executor: &'a MailQueryExecutor,
    max_results: u32,
}

impl<'a> MailSearch<'a> {
    pub fn new(executor: &'a MailQueryExecutor, max_results: u32) -> Self {
        Self {
            executor,
            max_results,
        }
    }

    /// Spam hits first, then inbox hits, user by user. Mailboxes that fail
    /// are logged and skipped.
    pub async fn search_sender(&self, credentials: &[Credential], sender: &str) -> Vec<SearchMessage> {
        let mut messages = Vec::new();

        for credential in credentials {
            let mut mailbox = self.executor.open(credential.clone());
            match self.search_mailbox(&mut mailbox, sender).await {
                Ok(found) => messages.extend(found),
                Err(e) => {
                    tracing::warn!("Search failed for {}: {}", credential.email, e);
                }
            }
        }

        messages
    }

    async fn search_mailbox(
        &self,
        mailbox: &mut Mailbox<'_>,
        sender: &str,
    ) -> Result<Vec<SearchMessage>, QueryError> {
        let mut found = Vec::new();

        for (folder, location) in [
            (Folder::Spam, MessageLocation::Spam),
            (Folder::NotSpam, MessageLocation::Inbox),
        ] {
            let query = MailQuery::from_sender(sender, folder, self.max_results);
            let refs = mailbox.list(&query).await?;

            for message_ref in refs {
                match mailbox.get(&message_ref.id).await {
                    Ok(detail) => found.push(annotate(
                        detail,
                        &mailbox.credential().email,
                        location,
                    )),
                    // Deleted between listing and fetching
                    Err(QueryError::Mail(MailError::NotFound(_))) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(found)
    }
}

fn annotate(detail: MessageDetail, user_email: &str, location: MessageLocation) -> SearchMessage {
    SearchMessage {
        id: detail.id,
        thread_id: detail.thread_id,
        user_email: user_email.to_string(),
        location,
        subject: detail.subject,
        from: detail.from,
        snippet: detail.snippet,
        received_at: detail.received_at,
        label_ids: detail.label_ids,
    }
}
