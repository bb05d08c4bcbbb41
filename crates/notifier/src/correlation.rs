//! Correlation store: expiring `apns:<identifier>` records for in-flight notifications.
//!
//! A missing record is a normal outcome (expired, already handled) and is
//! reported as `None`, never as an error.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::error::AppError;
use herald_common::types::CorrelationRecord;

/// Prefix shared by every correlation key.
pub const KEY_PREFIX: &str = "apns:";

/// Default record lifetime in seconds (1 hour).
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Writes the record only when no live key exists. Returns 1 if written.
const RESERVE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'token', ARGV[1], 'user_id', ARGV[2])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return 1
";

/// Correlation key for a notification identifier, e.g. `apns:100`.
pub fn correlation_key(identifier: u32) -> String {
    format!("{}{}", KEY_PREFIX, identifier)
}

/// Key-value store with per-key expiry.
///
/// Every operation is atomic for its key; no cross-key guarantees are made.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Replace the whole record at `key` and (re)start its expiry.
    async fn put(&self, key: &str, record: &CorrelationRecord, ttl: Duration)
    -> Result<(), AppError>;

    /// Write the record only if `key` has no live record.
    ///
    /// Returns `false` and leaves the existing record untouched when the key is
    /// taken. Check and write happen as one step, so two callers can never both
    /// claim the same key.
    async fn reserve(
        &self,
        key: &str,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<bool, AppError>;

    async fn get(&self, key: &str) -> Result<Option<CorrelationRecord>, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Redis-backed store: one hash per record with `EXPIRE` set.
#[derive(Clone)]
pub struct RedisCorrelationStore {
    redis: ConnectionManager,
}

impl RedisCorrelationStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn parse_record(
        key: &str,
        fields: HashMap<String, String>,
    ) -> Result<CorrelationRecord, AppError> {
        let token = fields
            .get("token")
            .cloned()
            .ok_or_else(|| AppError::Decode(format!("{} has no token field", key)))?;
        let user_id = fields
            .get("user_id")
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| AppError::Decode(format!("{} has no valid user_id field", key)))?;
        Ok(CorrelationRecord { token, user_id })
    }
}

#[async_trait]
impl CorrelationStore for RedisCorrelationStore {
    async fn put(
        &self,
        key: &str,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        let user_id = record.user_id.to_string();

        // MULTI / DEL / HSET / EXPIRE / EXEC so stale fields never survive an overwrite
        let _: () = redis::pipe()
            .atomic()
            .del(key)
            .ignore()
            .hset_multiple(
                key,
                &[("token", record.token.as_str()), ("user_id", user_id.as_str())],
            )
            .ignore()
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn reserve(
        &self,
        key: &str,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        let reserved: bool = redis::Script::new(RESERVE_SCRIPT)
            .key(key)
            .arg(record.token.as_str())
            .arg(record.user_id)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(reserved)
    }

    async fn get(&self, key: &str) -> Result<Option<CorrelationRecord>, AppError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Self::parse_record(key, fields).map(Some)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    record: CorrelationRecord,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process store. Expired entries are dropped lazily when touched.
#[derive(Debug, Default)]
pub struct MemoryCorrelationStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records that have not yet expired.
    pub fn live_count(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    fn live(&self, key: &str) -> Option<CorrelationRecord> {
        let now = Instant::now();
        // remove_if holds the shard lock, so a concurrent put cannot be lost here
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            return None;
        }
        self.entries.get(key).map(|entry| entry.record.clone())
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn put(
        &self,
        key: &str,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn reserve(
        &self,
        key: &str,
        record: &CorrelationRecord,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let entry = MemoryEntry {
            record: record.clone(),
            expires_at: now + ttl,
        };

        // the entry guard holds the shard lock across the check and the insert
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Ok(false);
                }
                occupied.insert(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<CorrelationRecord>, AppError> {
        Ok(self.live(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.live(key).is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(key);
        Ok(())
    }
}
