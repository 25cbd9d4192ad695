//! Per-identity TTL cache of stats records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pvpstats_core::StatsRecord;

use super::freshness::{is_fresh, CacheRead};
use super::traits::{CacheCounters, CacheStats};
use super::FetchTicket;

#[derive(Debug, Clone)]
struct CacheEntry {
    record: StatsRecord,
    cached_at: DateTime<Utc>,
}

/// Fetches of one name currently running against the store.
#[derive(Debug, Default)]
struct FetchState {
    /// Bumped by every invalidation while `in_flight > 0`.
    epoch: u64,
    in_flight: usize,
}

/// `display_name -> StatsRecord` memoization with a fixed TTL.
///
/// Stale entries are not swept; a read that finds one removes it and reports
/// a miss. A name with fetches in flight carries an invalidation epoch so that
/// a fetch started before an invalidation cannot repopulate the cache with
/// pre-write data. That state is dropped when the last fetch ends.
#[derive(Debug)]
pub struct StatsCache {
    entries: DashMap<String, CacheEntry>,
    fetches: DashMap<String, FetchState>,
    ttl: Duration,
    counters: CacheCounters,
}

/// A store fetch of one name, started by [`StatsCache::begin_fetch`].
///
/// Hand it to [`StatsCache::put_fetched`] with the result, or drop it when
/// there is nothing to cache.
#[must_use]
#[derive(Debug)]
pub struct StatsFetch<'a> {
    cache: &'a StatsCache,
    name: String,
    ticket: FetchTicket,
}

impl Drop for StatsFetch<'_> {
    fn drop(&mut self) {
        self.cache.end_fetch(&self.name);
    }
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            fetches: DashMap::new(),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry for `name`.
    pub fn get(&self, name: &str) -> Option<CacheRead<StatsRecord>> {
        let now = Utc::now();
        let cached = self
            .entries
            .get(name)
            .map(|entry| (entry.record.clone(), entry.cached_at));

        match cached {
            Some((record, cached_at)) if is_fresh(cached_at, self.ttl, now) => {
                self.counters.hit();
                Some(CacheRead::from_cache(record, cached_at))
            }
            Some((_, cached_at)) => {
                // Only drop the entry we judged stale, not one written since.
                if self
                    .entries
                    .remove_if(name, |_, entry| entry.cached_at == cached_at)
                    .is_some()
                {
                    self.counters.evicted();
                }
                self.counters.miss();
                tracing::trace!(name, "stats cache entry expired");
                None
            }
            None => {
                self.counters.miss();
                tracing::trace!(name, "stats cache miss");
                None
            }
        }
    }

    /// Register a fetch of `name` before querying the store.
    pub fn begin_fetch(&self, name: &str) -> StatsFetch<'_> {
        let ticket = {
            let mut state = self.fetches.entry(name.to_string()).or_default();
            state.in_flight += 1;
            FetchTicket(state.epoch)
        };
        StatsFetch {
            cache: self,
            name: name.to_string(),
            ticket,
        }
    }

    /// Cache the record `fetch` returned.
    ///
    /// Returns false, leaving the cache untouched, if the name was invalidated
    /// after the fetch began.
    pub fn put_fetched(&self, fetch: StatsFetch<'_>, record: StatsRecord) -> bool {
        let name = fetch.name.clone();
        if self.epoch(&name) != Some(fetch.ticket) {
            return false;
        }
        let cached_at = Utc::now();
        self.entries
            .insert(name.clone(), CacheEntry { record, cached_at });

        if self.epoch(&name) != Some(fetch.ticket) {
            self.entries
                .remove_if(&name, |_, entry| entry.cached_at == cached_at);
            return false;
        }
        true
    }

    /// Cache a record unconditionally, stamped now.
    pub fn put(&self, record: StatsRecord) {
        self.put_at(record, Utc::now());
    }

    /// Cache a record with an explicit timestamp.
    pub fn put_at(&self, record: StatsRecord, cached_at: DateTime<Utc>) {
        self.entries
            .insert(record.display_name.clone(), CacheEntry { record, cached_at });
    }

    /// Drop the entry for `name` and cancel in-flight fetches of it.
    pub fn invalidate(&self, name: &str) {
        if let Some(mut state) = self.fetches.get_mut(name) {
            state.epoch += 1;
        }
        self.entries.remove(name);
        self.counters.invalidated();
    }

    /// Whether an entry (fresh or stale) is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len() as u64)
    }

    /// Number of names with a fetch in flight.
    pub fn fetches_in_flight(&self) -> usize {
        self.fetches.len()
    }

    fn epoch(&self, name: &str) -> Option<FetchTicket> {
        self.fetches.get(name).map(|state| FetchTicket(state.epoch))
    }

    fn end_fetch(&self, name: &str) {
        if let Some(mut state) = self.fetches.get_mut(name) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.fetches.remove_if(name, |_, state| state.in_flight == 0);
    }
}
