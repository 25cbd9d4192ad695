//! PvP Stats Storage - Repository Trait, In-Memory Repository and Read Cache
//!
//! Defines the storage abstraction for stats records. The PostgreSQL
//! implementation lives in pvpstats-service; this crate carries the in-memory
//! implementation used by tests and local runs, and the TTL read cache the
//! orchestrator fronts the repository with.

pub mod cache;
pub mod memory;

pub use cache::{
    CacheRead, CacheStats, FetchTicket, LeaderboardCache, LeaderboardSnapshot, ReadCache,
    StatsCache, StatsFetch,
};
pub use memory::InMemoryStatsRepository;

use async_trait::async_trait;
use pvpstats_core::{LeaderboardEntry, Rank, StableId, StatsRecord, StatsResult};
use std::fmt;

// ============================================================================
// REPOSITORY OPERATIONS
// ============================================================================

/// Names of repository operations, used in errors, logs and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOp {
    FindByName,
    FindByStableId,
    UpsertIdentity,
    RenameByStableId,
    IncrementKill,
    IncrementDeathResetStreak,
    TopKills,
    RankByKills,
}

impl RepositoryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindByName => "find_by_name",
            Self::FindByStableId => "find_by_stable_id",
            Self::UpsertIdentity => "upsert_identity",
            Self::RenameByStableId => "rename_by_stable_id",
            Self::IncrementKill => "increment_kill",
            Self::IncrementDeathResetStreak => "increment_death_reset_streak",
            Self::TopKills => "top_kills",
            Self::RankByKills => "rank_by_kills",
        }
    }
}

impl fmt::Display for RepositoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// REPOSITORY TRAIT
// ============================================================================

/// Translation of stats operations into store queries.
///
/// Implementations own no state beyond their connection handle: no caching,
/// no retries. Every method is a single atomic statement against the store.
/// Missing records are reported as `None` or as a no-op, never as an error.
#[async_trait]
pub trait StatsRepository: Send + Sync + 'static {
    /// Exact match on display name.
    async fn find_by_name(&self, name: &str) -> StatsResult<Option<StatsRecord>>;

    /// Exact match on stable id.
    async fn find_by_stable_id(&self, id: StableId) -> StatsResult<Option<StatsRecord>>;

    /// Ensure a record exists for `name`.
    ///
    /// A new record starts with zeroed counters and `id`. For an existing
    /// record the stable id is replaced only when `overwrite_id_on_name_collision`
    /// is set. If `id` already belongs to another record nothing is created and
    /// no id is moved; the caller reconciles by renaming instead.
    async fn upsert_identity(
        &self,
        name: &str,
        id: StableId,
        overwrite_id_on_name_collision: bool,
    ) -> StatsResult<()>;

    /// Rename the record holding `id`. No-op if no record matches.
    async fn rename_by_stable_id(&self, id: StableId, new_name: &str) -> StatsResult<()>;

    /// `kills += 1; killstreak += 1`. No-op if `name` has no record.
    async fn increment_kill(&self, name: &str) -> StatsResult<()>;

    /// `deaths += 1; killstreak = 0`. No-op if `name` has no record.
    async fn increment_death_reset_streak(&self, name: &str) -> StatsResult<()>;

    /// Up to `limit` entries in canonical leaderboard order.
    async fn top_kills(&self, limit: usize) -> StatsResult<Vec<LeaderboardEntry>>;

    /// 1 + number of records strictly ahead of `name`; `None` if unranked.
    async fn rank_by_kills(&self, name: &str) -> StatsResult<Option<Rank>>;
}
