//! PvP Stats Core - Entity Types
//!
//! Pure data structures shared by the storage and service crates: the per-player
//! stats record, leaderboard entries, ranks, the error taxonomy and configuration.

pub mod config;
pub mod error;

pub use config::{
    clamp_ttl, StatsConfig, SyncPolicy, DEFAULT_CACHE_TTL, DEFAULT_LEADERBOARD_FETCH_FLOOR,
    DEFAULT_WORKER_POOL_SIZE, MIN_CACHE_TTL,
};
pub use error::{ConfigError, StatsError, StatsResult, StorageError};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Stable identity of a player, independent of the display name they use.
///
/// Never reused across identities and never changed once assigned to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for StableId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for StableId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// STATS RECORD
// ============================================================================

/// Combat statistics for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Unique, mutable, primary lookup key.
    pub display_name: String,
    pub stable_id: StableId,
    pub kills: u32,
    pub deaths: u32,
    /// Kills since the last recorded death.
    pub killstreak: u32,
}

impl StatsRecord {
    /// A fresh record with zeroed counters.
    pub fn new(display_name: impl Into<String>, stable_id: StableId) -> Self {
        Self {
            display_name: display_name.into(),
            stable_id,
            kills: 0,
            deaths: 0,
            killstreak: 0,
        }
    }

    /// Kills-to-deaths ratio.
    ///
    /// With zero deaths the denominator is shifted to one, so a player with
    /// 7 kills and no deaths has a KDR of 7.0.
    pub fn kdr(&self) -> f64 {
        if self.deaths > 0 {
            f64::from(self.kills) / f64::from(self.deaths)
        } else {
            f64::from(self.kills) / (f64::from(self.deaths) + 1.0)
        }
    }

    /// Project this record onto its leaderboard entry.
    pub fn leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            display_name: self.display_name.clone(),
            kills: self.kills,
        }
    }
}

// ============================================================================
// LEADERBOARD
// ============================================================================

/// A `(display_name, kills)` snapshot pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub kills: u32,
}

impl LeaderboardEntry {
    pub fn new(display_name: impl Into<String>, kills: u32) -> Self {
        Self {
            display_name: display_name.into(),
            kills,
        }
    }
}

/// Canonical leaderboard order: kills descending, then display name ascending
/// (byte-wise). Total over distinct names.
pub fn leaderboard_order(a_name: &str, a_kills: u32, b_name: &str, b_kills: u32) -> Ordering {
    b_kills
        .cmp(&a_kills)
        .then_with(|| a_name.as_bytes().cmp(b_name.as_bytes()))
}

/// Whether `other` sorts strictly ahead of `me` in [`leaderboard_order`].
pub fn is_ahead(other_name: &str, other_kills: u32, my_name: &str, my_kills: u32) -> bool {
    leaderboard_order(other_name, other_kills, my_name, my_kills) == Ordering::Less
}

/// 1-based position in the kills leaderboard.
///
/// "Unranked" is expressed as `Option::<Rank>::None`, never as a zero rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rank(NonZeroU32);

impl Rank {
    /// The leader's rank.
    pub const FIRST: Rank = Rank(NonZeroU32::MIN);

    /// Returns `None` for zero.
    pub fn new(position: u32) -> Option<Self> {
        NonZeroU32::new(position).map(Self)
    }

    /// Rank of a record with `ahead` records strictly in front of it.
    pub fn from_ahead(ahead: u64) -> Self {
        let position = u32::try_from(ahead).unwrap_or(u32::MAX - 1).saturating_add(1);
        Self(NonZeroU32::new(position).unwrap_or(NonZeroU32::MAX))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For distinct names exactly one of the pair is ahead of the other.
        #[test]
        fn prop_order_is_total(
            a in "[a-zA-Z0-9_]{1,16}",
            b in "[a-zA-Z0-9_]{1,16}",
            ka in 0u32..50,
            kb in 0u32..50,
        ) {
            prop_assume!(a != b);
            prop_assert!(is_ahead(&a, ka, &b, kb) != is_ahead(&b, kb, &a, ka));
        }

        /// More kills always means ahead, regardless of name.
        #[test]
        fn prop_more_kills_is_ahead(
            a in "[a-z]{1,16}",
            b in "[a-z]{1,16}",
            k in 0u32..1000,
            extra in 1u32..100,
        ) {
            prop_assert!(is_ahead(&a, k + extra, &b, k));
        }
    }
}
