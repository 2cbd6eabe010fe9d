use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use shared_types::Tag;
use uuid::Uuid;

use crate::models::{NewUser, ProfileUpdate, TokenUpdate, User};

pub type DbPool = Pool<AsyncPgConnection>;

pub type PooledConn = diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    // Set up rustls TLS configuration
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

/// Build the connection pool. Connections are opened lazily on first use.
pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

pub async fn get_conn(pool: &DbPool) -> anyhow::Result<PooledConn> {
    pool.get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get database connection: {}", e))
}

const TAG_COLUMNS: (
    crate::schema::tags::id,
    crate::schema::tags::name,
    crate::schema::tags::created_at,
    crate::schema::tags::updated_at,
) = (
    crate::schema::tags::id,
    crate::schema::tags::name,
    crate::schema::tags::created_at,
    crate::schema::tags::updated_at,
);

// User database operations
pub mod users {
    use super::*;
    use crate::schema::{tags, user_tags, users};

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<User>> {
        let rows = users::table
            .select(User::as_select())
            .order_by(users::created_at.asc())
            .load(conn)
            .await?;

        Ok(rows)
    }

    /// Users that do not carry the given tag.
    pub async fn list_without_tag(
        conn: &mut AsyncPgConnection,
        tag_name: &str,
    ) -> anyhow::Result<Vec<User>> {
        let tagged = user_tags::table
            .inner_join(tags::table)
            .filter(tags::name.eq(tag_name))
            .select(user_tags::user_id);

        let rows = users::table
            .filter(diesel::dsl::not(users::id.eq_any(tagged)))
            .select(User::as_select())
            .order_by(users::created_at.asc())
            .load(conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_with_access_token(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<User>> {
        let rows = users::table
            .filter(users::access_token.is_not_null())
            .select(User::as_select())
            .order_by(users::created_at.asc())
            .load(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> anyhow::Result<Option<User>> {
        let user = users::table
            .filter(users::id.eq(user_id))
            .select(User::as_select())
            .first(conn)
            .await
            .optional()?;

        Ok(user)
    }

    /// Insert a user from the OAuth callback, or refresh profile and tokens
    /// of the existing row with the same email.
    pub async fn upsert_from_oauth(
        conn: &mut AsyncPgConnection,
        new_user: NewUser<'_>,
    ) -> anyhow::Result<User> {
        let update = ProfileUpdate {
            name: new_user.name,
            picture: new_user.picture,
            access_token: new_user.access_token,
            refresh_token: new_user.refresh_token,
            updated_at: Utc::now(),
        };

        let user = diesel::insert_into(users::table)
            .values(&new_user)
            .on_conflict(users::email)
            .do_update()
            .set(&update)
            .returning(User::as_returning())
            .get_result(conn)
            .await?;

        Ok(user)
    }

    pub async fn update_tokens(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> anyhow::Result<()> {
        let update = TokenUpdate {
            access_token: Some(access_token),
            refresh_token,
            updated_at: Utc::now(),
        };

        let updated = diesel::update(users::table.filter(users::id.eq(user_id)))
            .set(&update)
            .execute(conn)
            .await?;

        if updated == 0 {
            anyhow::bail!("user {} not found", user_id);
        }

        Ok(())
    }

    /// Every `(user_id, tag)` pair, for building user listings.
    pub async fn list_tag_links(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<(Uuid, Tag)>> {
        let links = user_tags::table
            .inner_join(tags::table)
            .select((user_tags::user_id, TAG_COLUMNS))
            .order_by(tags::name.asc())
            .load::<(Uuid, Tag)>(conn)
            .await?;

        Ok(links)
    }
}

// Tag database operations
pub mod tags {
    use super::*;
    use crate::schema::{tags, user_tags};

    pub async fn list_all(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Tag>> {
        let rows = tags::table
            .select(TAG_COLUMNS)
            .order_by(tags::name.asc())
            .load::<Tag>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_by_id(conn: &mut AsyncPgConnection, tag_id: Uuid) -> anyhow::Result<Option<Tag>> {
        let tag = tags::table
            .filter(tags::id.eq(tag_id))
            .select(TAG_COLUMNS)
            .first::<Tag>(conn)
            .await
            .optional()?;

        Ok(tag)
    }

    /// Create a tag, or return the existing one with the same name.
    pub async fn upsert_by_name(conn: &mut AsyncPgConnection, tag_name: &str) -> anyhow::Result<Tag> {
        let tag = diesel::insert_into(tags::table)
            .values(tags::name.eq(tag_name))
            .on_conflict(tags::name)
            .do_update()
            .set(tags::name.eq(tag_name))
            .returning(TAG_COLUMNS)
            .get_result::<Tag>(conn)
            .await?;

        Ok(tag)
    }

    /// Returns false when no tag had the given id.
    pub async fn delete(conn: &mut AsyncPgConnection, tag_id: Uuid) -> anyhow::Result<bool> {
        let deleted = diesel::delete(tags::table.filter(tags::id.eq(tag_id)))
            .execute(conn)
            .await?;

        Ok(deleted > 0)
    }

    pub async fn list_for_user(conn: &mut AsyncPgConnection, user_id: Uuid) -> anyhow::Result<Vec<Tag>> {
        let rows = user_tags::table
            .inner_join(tags::table)
            .filter(user_tags::user_id.eq(user_id))
            .select(TAG_COLUMNS)
            .order_by(tags::name.asc())
            .load::<Tag>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn attach(conn: &mut AsyncPgConnection, user_id: Uuid, tag_id: Uuid) -> anyhow::Result<()> {
        diesel::insert_into(user_tags::table)
            .values((user_tags::user_id.eq(user_id), user_tags::tag_id.eq(tag_id)))
            .on_conflict_do_nothing()
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn detach(conn: &mut AsyncPgConnection, user_id: Uuid, tag_id: Uuid) -> anyhow::Result<()> {
        diesel::delete(
            user_tags::table
                .filter(user_tags::user_id.eq(user_id))
                .filter(user_tags::tag_id.eq(tag_id)),
        )
        .execute(conn)
        .await?;

        Ok(())
    }
}

// Cache entry database operations
pub mod cache_entries {
    use super::*;
    use crate::schema::cache_entries;

    pub async fn get(
        conn: &mut AsyncPgConnection,
        cache_key: &str,
    ) -> anyhow::Result<Option<(String, Option<DateTime<Utc>>)>> {
        let entry = cache_entries::table
            .filter(cache_entries::key.eq(cache_key))
            .select((cache_entries::value, cache_entries::expires_at))
            .first::<(String, Option<DateTime<Utc>>)>(conn)
            .await
            .optional()?;

        Ok(entry)
    }

    pub async fn put(
        conn: &mut AsyncPgConnection,
        cache_key: &str,
        cache_value: &str,
        expires: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        diesel::insert_into(cache_entries::table)
            .values((
                cache_entries::key.eq(cache_key),
                cache_entries::value.eq(cache_value),
                cache_entries::expires_at.eq(expires),
            ))
            .on_conflict(cache_entries::key)
            .do_update()
            .set((
                cache_entries::value.eq(cache_value),
                cache_entries::expires_at.eq(expires),
            ))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Drop every entry whose expiry has passed.
    pub async fn purge_expired(conn: &mut AsyncPgConnection) -> anyhow::Result<usize> {
        let removed = diesel::delete(
            cache_entries::table.filter(cache_entries::expires_at.le(Utc::now())),
        )
        .execute(conn)
        .await?;

        Ok(removed)
    }

    pub async fn delete(conn: &mut AsyncPgConnection, cache_key: &str) -> anyhow::Result<()> {
        diesel::delete(cache_entries::table.filter(cache_entries::key.eq(cache_key)))
            .execute(conn)
            .await?;

        Ok(())
    }
}
