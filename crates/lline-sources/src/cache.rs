//! Keyed, expiring cache of per-user language statistics.
//!
//! Entries are keyed by the trimmed, lower-cased username and expire after
//! a fixed TTL. Failed fetches are never stored.

use crate::stats::{LanguageStatsSource, StatsError};
use async_trait::async_trait;
use lline_core::LanguageEntry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

struct CachedEntry {
    languages: Vec<LanguageEntry>,
    stored_at: Instant,
}

pub struct StatsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedEntry>>,
}

fn cache_key(user: &str) -> String {
    user.trim().to_lowercase()
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh entry for `user`, dropping it if it has expired.
    pub fn get(&self, user: &str) -> Option<Vec<LanguageEntry>> {
        let key = cache_key(user);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.languages.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store `languages` for `user`, dropping any entries that have expired.
    pub fn insert(&self, user: &str, languages: Vec<LanguageEntry>) {
        let ttl = self.ttl;
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        entries.insert(
            cache_key(user),
            CachedEntry {
                languages,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns true if an entry was removed.
    pub fn invalidate(&self, user: &str) -> bool {
        self.lock().remove(&cache_key(user)).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Any stats source, fronted by a [`StatsCache`].
pub struct CachedStatsSource<S> {
    inner: S,
    cache: StatsCache,
}

impl<S: LanguageStatsSource> CachedStatsSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            cache: StatsCache::new(ttl),
        }
    }

    pub fn cache(&self) -> &StatsCache {
        &self.cache
    }
}

#[async_trait]
impl<S: LanguageStatsSource> LanguageStatsSource for CachedStatsSource<S> {
    async fn fetch(&self, user: &str) -> Result<Vec<LanguageEntry>, StatsError> {
        if user.trim().is_empty() {
            return Err(StatsError::MissingUser);
        }
        if let Some(hit) = self.cache.get(user) {
            tracing::debug!(user, languages = hit.len(), "language stats cache hit");
            return Ok(hit);
        }
        let languages = self.inner.fetch(user).await?;
        self.cache.insert(user, languages.clone());
        Ok(languages)
    }
}
