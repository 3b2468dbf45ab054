//! DNS reply cache with lazy TTL-based expiration.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::dns::{Query, Reply, TYPE_A, TYPE_AAAA, type_name};

/// Cache slot of an address query: the question name and type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub qtype: u16,
}

impl CacheKey {
    /// Derive the key of a query.
    ///
    /// Only queries with exactly one question of type A or AAAA have a key.
    pub fn from_query(query: &Query) -> Option<Self> {
        let question = query.question.as_ref()?;
        matches!(question.qtype, TYPE_A | TYPE_AAAA).then(|| Self {
            name: question.name.clone(),
            qtype: question.qtype,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, type_name(self.qtype))
    }
}

struct CacheEntry {
    reply: Arc<[u8]>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Shared map from [`CacheKey`] to upstream reply.
///
/// One mutex guards the whole map. Entries are checked for expiry when they
/// are looked up and removed at that moment; nothing sweeps in the background
/// unless the owner calls [`RecordCache::purge_expired`].
pub struct RecordCache {
    entries: Mutex<FxHashMap<CacheKey, CacheEntry>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Look up the cached reply for a query.
    ///
    /// The returned bytes still carry the transaction id of the upstream
    /// exchange that produced them.
    pub fn find(&self, query: &Query) -> Option<Arc<[u8]>> {
        let key = CacheKey::from_query(query)?;
        let now = Instant::now();

        let Ok(mut entries) = self.entries.lock() else {
            return None;
        };
        let entry = entries.get(&key)?;
        if entry.is_valid(now) {
            debug!(key = %key, "cache hit");
            return Some(Arc::clone(&entry.reply));
        }

        entries.remove(&key);
        debug!(key = %key, "cache entry expired");
        None
    }

    /// Cache a reply under the query's key.
    ///
    /// Does nothing for queries without a key or replies without answers.
    /// The entry lives for the TTL of the reply's first answer record.
    pub fn store(&self, query: &Query, reply: &[u8]) {
        let Some(key) = CacheKey::from_query(query) else {
            return;
        };
        let Some(ttl) = Reply::parse(reply).ok().and_then(|r| r.first_answer_ttl) else {
            return;
        };
        // TTLs with the top bit set are negative and count as zero.
        let ttl = if ttl > i32::MAX as u32 { 0 } else { ttl };

        let entry = CacheEntry {
            reply: Arc::from(reply),
            expires_at: Instant::now() + Duration::from_secs(u64::from(ttl)),
        };

        debug!(key = %key, ttl, "cache store");
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, entry);
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
