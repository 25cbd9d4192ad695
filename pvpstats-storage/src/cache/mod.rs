//! TTL read cache in front of the stats repository.
//!
//! Two independent caches share one TTL:
//!
//! - [`StatsCache`]: per-identity memoization of the last fetched record.
//! - [`LeaderboardCache`]: one atomically swapped leaderboard page.
//!
//! A write that touches a display name invalidates that name's entry and the
//! whole leaderboard, since any kill or death can reorder it. Fetches register
//! first ([`StatsFetch`] per name, a [`FetchTicket`] for the leaderboard); a
//! fetch that raced with an invalidation is returned to its caller but not
//! cached.
//!
//! # Example
//!
//! ```ignore
//! let cache = ReadCache::new(Duration::from_secs(60));
//!
//! if let Some(read) = cache.stats().get("alice") {
//!     return read.into_value();
//! }
//! let fetch = cache.stats().begin_fetch("alice");
//! if let Some(record) = repo.find_by_name("alice").await? {
//!     cache.stats().put_fetched(fetch, record.clone());
//! }
//! ```

pub mod freshness;
pub mod identity;
pub mod leaderboard;
pub mod traits;

pub use freshness::{is_fresh, staleness_at, CacheRead};
pub use identity::{StatsCache, StatsFetch};
pub use leaderboard::{LeaderboardCache, LeaderboardSnapshot};
pub use traits::CacheStats;

use pvpstats_core::clamp_ttl;
use std::time::Duration;

/// Invalidation epoch or generation observed when a fetch started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(pub(crate) u64);

/// The per-identity and leaderboard caches, owned together by the orchestrator.
#[derive(Debug)]
pub struct ReadCache {
    stats: StatsCache,
    leaderboard: LeaderboardCache,
    ttl: Duration,
}

impl ReadCache {
    /// Create both caches with `ttl`, clamped to the 5 second floor.
    pub fn new(ttl: Duration) -> Self {
        let ttl = clamp_ttl(ttl);
        Self {
            stats: StatsCache::new(ttl),
            leaderboard: LeaderboardCache::new(ttl),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> &StatsCache {
        &self.stats
    }

    pub fn leaderboard(&self) -> &LeaderboardCache {
        &self.leaderboard
    }

    /// Invalidate every name touched by a write, and the leaderboard.
    pub fn invalidate_for_write<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.stats.invalidate(name);
        }
        self.leaderboard.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvpstats_core::{LeaderboardEntry, StableId, StatsRecord};

    #[test]
    fn test_ttl_is_clamped() {
        let cache = ReadCache::new(Duration::from_secs(1));
        assert_eq!(cache.ttl(), Duration::from_secs(5));
        assert_eq!(cache.stats().ttl(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalidate_for_write_clears_names_and_leaderboard() {
        let cache = ReadCache::new(Duration::from_secs(60));
        cache.stats().put(StatsRecord::new("alice", StableId::generate()));
        cache.stats().put(StatsRecord::new("bob", StableId::generate()));
        cache.stats().put(StatsRecord::new("carol", StableId::generate()));
        let ticket = cache.leaderboard().begin_fetch();
        cache
            .leaderboard()
            .store_fetched(ticket, vec![LeaderboardEntry::new("alice", 1)], 10);

        cache.invalidate_for_write(["alice", "bob"]);

        assert!(!cache.stats().contains("alice"));
        assert!(!cache.stats().contains("bob"));
        assert!(cache.stats().contains("carol"));
        assert!(cache.leaderboard().is_empty());
    }
}
