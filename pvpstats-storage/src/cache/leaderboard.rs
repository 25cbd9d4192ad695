//! Single-slot TTL cache of the top-kills leaderboard.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use pvpstats_core::LeaderboardEntry;

use super::freshness::{is_fresh, CacheRead};
use super::traits::{CacheCounters, CacheStats};
use super::FetchTicket;

/// An immutable leaderboard page as fetched from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
    pub cached_at: DateTime<Utc>,
    /// The limit the page was fetched with. May exceed `entries.len()` when
    /// the store holds fewer records.
    pub fetched_limit: usize,
}

impl LeaderboardSnapshot {
    /// Whether this snapshot can answer a request for `limit` entries.
    pub fn covers(&self, limit: usize) -> bool {
        !self.entries.is_empty() && self.fetched_limit >= limit
    }
}

/// Holds the current leaderboard snapshot.
///
/// The snapshot is swapped atomically and never mutated in place, so readers
/// see either the previous or the next complete page.
#[derive(Debug)]
pub struct LeaderboardCache {
    slot: ArcSwapOption<LeaderboardSnapshot>,
    generation: AtomicU64,
    ttl: Duration,
    counters: CacheCounters,
}

impl LeaderboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: ArcSwapOption::const_empty(),
            generation: AtomicU64::new(0),
            ttl,
            counters: CacheCounters::default(),
        }
    }

    /// Return the cached snapshot if it is fresh and was fetched with a
    /// limit of at least `limit`.
    pub fn get(&self, limit: usize) -> Option<CacheRead<Arc<LeaderboardSnapshot>>> {
        let snapshot = self.slot.load_full();
        match snapshot {
            Some(snapshot)
                if snapshot.covers(limit)
                    && is_fresh(snapshot.cached_at, self.ttl, Utc::now()) =>
            {
                self.counters.hit();
                let cached_at = snapshot.cached_at;
                Some(CacheRead::from_cache(snapshot, cached_at))
            }
            _ => {
                self.counters.miss();
                tracing::trace!(limit, "leaderboard cache miss");
                None
            }
        }
    }

    /// Record the invalidation generation before querying the store.
    pub fn begin_fetch(&self) -> FetchTicket {
        FetchTicket(self.generation.load(Ordering::SeqCst))
    }

    /// Replace the slot with a freshly fetched page.
    ///
    /// The page is returned either way; it is only kept in the slot if no
    /// invalidation happened since `ticket` was taken.
    pub fn store_fetched(
        &self,
        ticket: FetchTicket,
        entries: Vec<LeaderboardEntry>,
        fetched_limit: usize,
    ) -> Arc<LeaderboardSnapshot> {
        let snapshot = Arc::new(LeaderboardSnapshot {
            entries,
            cached_at: Utc::now(),
            fetched_limit,
        });
        if self.generation.load(Ordering::SeqCst) != ticket.0 {
            return snapshot;
        }
        self.slot.store(Some(Arc::clone(&snapshot)));

        if self.generation.load(Ordering::SeqCst) != ticket.0 {
            let stored = Some(Arc::clone(&snapshot));
            self.slot.compare_and_swap(&stored, None);
        }
        snapshot
    }

    /// Install a snapshot unconditionally.
    pub fn store(&self, snapshot: LeaderboardSnapshot) {
        self.slot.store(Some(Arc::new(snapshot)));
    }

    /// Clear the slot and cancel in-flight fetches.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.slot.store(None);
        self.counters.invalidated();
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    pub fn stats(&self) -> CacheStats {
        let entry_count = self
            .slot
            .load()
            .as_ref()
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0);
        self.counters.snapshot(entry_count)
    }
}
