//! In-memory TTL cache for resolved permissions.
//!
//! One entry per username, expiring a fixed interval after insertion.
//! Expiry is checked lazily at read time; there is no background sweeper,
//! so an expired entry occupies memory until its key is read or invalidated
//! again. With multiple service instances this cache is per-instance; a
//! shared store would be needed for coherent invalidation across a fleet.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::permissions::PermissionRecord;
use crate::types::Username;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    record: PermissionRecord,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe username → [`PermissionRecord`] store with lazy expiry.
///
/// Callers never need external locking; a `put` is immediately visible to
/// subsequent `get`s on the same key from any task. Concurrent misses for
/// the same username may each recompute independently; the last `put`
/// wins and is the only state observable afterwards.
pub struct PermissionCache {
    entries: RwLock<HashMap<Username, CacheEntry>>,
    ttl: Duration,
}

impl PermissionCache {
    /// Create a cache with the default 15-minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create a cache with an explicit TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a user's record, removing it first if its TTL has elapsed.
    pub async fn get(&self, username: &Username) -> Option<PermissionRecord> {
        {
            let entries = self.entries.read().await;
            match entries.get(username) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(entry.record.clone()),
                Some(_) => {}
            }
        }

        // Expired: upgrade to a write lock and drop the entry. Re-check
        // under the write lock in case another task refreshed it meanwhile.
        let mut entries = self.entries.write().await;
        match entries.get(username) {
            Some(entry) if entry.is_expired() => {
                debug!(user = %username, "permission cache entry expired");
                entries.remove(username);
                None
            }
            Some(entry) => Some(entry.record.clone()),
            None => None,
        }
    }

    /// Store a record, replacing any previous entry for the user.
    pub async fn put(&self, username: Username, record: PermissionRecord) {
        debug!(user = %username, ttl_secs = self.ttl.as_secs(), "caching permissions");
        let entry = CacheEntry {
            record,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(username, entry);
    }

    /// Drop a single user's entry.
    pub async fn invalidate(&self, username: &Username) {
        debug!(user = %username, "permission cache invalidated");
        self.entries.write().await.remove(username);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        info!("permission cache cleared");
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new()
    }
}
