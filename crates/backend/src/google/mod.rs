//! Clients for Google's identity provider and the Gmail API.

pub mod gmail;
pub mod oauth;

pub use gmail::{Folder, GmailClient, MailError, MailProvider, MailQuery, MessageDetail, MessageRef};
pub use oauth::{
    GoogleOAuthClient, GoogleOAuthConfig, GoogleUserInfo, IdentityProvider, OAuthError, TokenGrant,
};
