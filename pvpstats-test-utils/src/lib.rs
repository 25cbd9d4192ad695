//! PvP Stats Test Utilities
//!
//! Shared test infrastructure for the pvpstats workspace:
//! - Proptest generators for identities and stats records
//! - Fixtures: test configuration and seeded in-memory repositories
//! - Assertions over leaderboard order

pub use pvpstats_core::{
    leaderboard_order, LeaderboardEntry, Rank, StableId, StatsConfig, StatsRecord, SyncPolicy,
};
pub use pvpstats_storage::InMemoryStatsRepository;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for stats types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random StableId.
    pub fn arb_stable_id() -> impl Strategy<Value = StableId> {
        any::<[u8; 16]>().prop_map(|bytes| StableId::new(Uuid::from_bytes(bytes)))
    }

    /// Generate a display name in the shape game servers allow.
    pub fn arb_display_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_]{3,16}"
    }

    /// Generate a counter value small enough to produce frequent ties.
    pub fn arb_counter() -> impl Strategy<Value = u32> {
        0u32..50
    }

    /// Generate a StatsRecord with arbitrary counters.
    pub fn arb_stats_record() -> impl Strategy<Value = StatsRecord> {
        (
            arb_display_name(),
            arb_stable_id(),
            arb_counter(),
            arb_counter(),
            arb_counter(),
        )
            .prop_map(|(display_name, stable_id, kills, deaths, killstreak)| StatsRecord {
                display_name,
                stable_id,
                kills,
                deaths,
                killstreak: killstreak.min(kills),
            })
    }

    /// Generate up to `max` records with distinct names and distinct ids.
    pub fn arb_distinct_records(max: usize) -> impl Strategy<Value = Vec<StatsRecord>> {
        prop::collection::btree_map(arb_display_name(), (arb_counter(), arb_counter()), 0..max)
            .prop_map(|by_name| {
                by_name
                    .into_iter()
                    .enumerate()
                    .map(|(i, (display_name, (kills, deaths)))| StatsRecord {
                        display_name,
                        stable_id: StableId::new(Uuid::from_u128(i as u128 + 1)),
                        kills,
                        deaths,
                        killstreak: 0,
                    })
                    .collect()
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// One worker so background jobs run in submission order.
    pub fn test_config() -> StatsConfig {
        StatsConfig::new()
            .with_worker_pool_size(1)
            .with_cache_ttl(Duration::from_secs(60))
    }

    /// A record with the given counters and a fresh stable id.
    pub fn record(name: &str, kills: u32, deaths: u32) -> StatsRecord {
        StatsRecord {
            kills,
            deaths,
            ..StatsRecord::new(name, StableId::generate())
        }
    }

    /// `(alice,10) (bob,10) (carol,5)`: a tie at the top broken by name.
    pub fn tie_board() -> Vec<StatsRecord> {
        vec![
            record("alice", 10, 2),
            record("bob", 10, 4),
            record("carol", 5, 5),
        ]
    }

    /// An in-memory repository holding `records`.
    ///
    /// Panics if two records share a name or a stable id.
    pub fn seeded_repository(
        records: impl IntoIterator<Item = StatsRecord>,
    ) -> Arc<InMemoryStatsRepository> {
        match InMemoryStatsRepository::with_records(records) {
            Ok(repo) => Arc::new(repo),
            Err(e) => panic!("invalid fixture records: {e}"),
        }
    }

    /// `count` players named `player00`, `player01`, ... with descending kills.
    pub fn ladder(count: usize) -> Vec<StatsRecord> {
        (0..count)
            .map(|i| record(&format!("player{i:02}"), (count - i) as u32 * 3, 1))
            .collect()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Assert that `entries` are in canonical leaderboard order.
pub fn assert_leaderboard_sorted(entries: &[LeaderboardEntry]) {
    for pair in entries.windows(2) {
        let order = leaderboard_order(
            &pair[0].display_name,
            pair[0].kills,
            &pair[1].display_name,
            pair[1].kills,
        );
        assert_eq!(
            order,
            Ordering::Less,
            "{:?} should sort before {:?}",
            pair[0],
            pair[1]
        );
    }
}
