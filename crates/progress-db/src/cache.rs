//! Keyed in-memory cache with a fixed TTL.
//!
//! The leaderboard read path caches its snapshot under a single key; the
//! only invalidation besides expiry is `clear`, which empties everything.
//! The handle is passed in explicitly rather than living in a global.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Singleton key under which the leaderboard snapshot is cached.
pub const LEADERBOARD_CACHE_KEY: &str = "leaderboard_data";

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live entry. Expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: T) {
        self.lock().insert(key.to_string(), (Instant::now(), value));
    }

    /// Clear-everything invalidation; there is no per-key variant.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, T)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
