// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_types::{Tag, UserResponse};
use uuid::Uuid;

use crate::mail::Credential;

/// Database representation of users, including their OAuth tokens
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub google_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn into_response(self, tags: Vec<Tag>) -> UserResponse {
        UserResponse {
            id: self.id,
            has_access_token: self.access_token.is_some(),
            has_refresh_token: self.refresh_token.is_some(),
            email: self.email,
            name: self.name,
            picture: self.picture,
            created_at: self.created_at,
            updated_at: self.updated_at,
            tags,
        }
    }
}

impl From<User> for Credential {
    fn from(user: User) -> Self {
        Credential {
            user_id: user.id,
            email: user.email,
            access_token: user.access_token,
            refresh_token: user.refresh_token,
        }
    }
}

/// Insertable struct for users arriving through the OAuth callback
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub picture: Option<&'a str>,
    pub google_id: &'a str,
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
}

/// Profile and token changes applied when a known user signs in again.
///
/// `None` fields are skipped, so a missing refresh token keeps the stored one.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
pub struct ProfileUpdate<'a> {
    pub name: &'a str,
    pub picture: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

/// Token write-back after a refresh
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
pub struct TokenUpdate<'a> {
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}
