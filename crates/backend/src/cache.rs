//! Key/value cache with per-entry expiry. Expiry is checked on read and
//! expired entries are swept on every write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crate::db::{self, DbPool};

#[async_trait]
pub trait Cache: Send + Sync {
    /// Value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store `value`; a `ttl` of `None` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()>;

    async fn forget(&self, key: &str) -> anyhow::Result<()>;
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory cache lock poisoned"))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.lock()?;

        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at.is_some_and(|at| Instant::now() >= at),
        };

        if expired {
            entries.remove(key);
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let now = Instant::now();
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        };

        // Entries that are never read back again are dropped here.
        let mut entries = self.lock()?;
        entries.retain(|_, e| !e.expires_at.is_some_and(|at| now >= at));
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn forget(&self, key: &str) -> anyhow::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Cache shared between instances through the `cache_entries` table
#[derive(Clone)]
pub struct PgCache {
    pool: DbPool,
}

impl PgCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Cache for PgCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = db::get_conn(&self.pool).await?;

        match db::cache_entries::get(&mut conn, key).await? {
            Some((_, Some(expires_at))) if Utc::now() >= expires_at => {
                db::cache_entries::delete(&mut conn, key).await?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(Utc::now() + chrono::Duration::from_std(ttl)?),
            None => None,
        };

        let mut conn = db::get_conn(&self.pool).await?;
        db::cache_entries::purge_expired(&mut conn).await?;
        db::cache_entries::put(&mut conn, key, value, expires_at).await
    }

    async fn forget(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = db::get_conn(&self.pool).await?;
        db::cache_entries::delete(&mut conn, key).await
    }
}
