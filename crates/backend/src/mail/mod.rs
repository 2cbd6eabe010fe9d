//! Per-user mailbox queries with token refresh, and the operations built on
//! them: the spam health aggregate and the cross-mailbox search.

pub mod aggregator;
pub mod credentials;
pub mod executor;
pub mod refresher;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use credentials::{Credential, CredentialStore, MailboxScope, PgCredentialStore, ADMIN_TAG};
pub use executor::{Mailbox, MailQueryExecutor, QueryError};
pub use refresher::{RefreshError, TokenRefresher};
pub use search::MailSearch;
