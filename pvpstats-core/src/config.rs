//! Configuration types

use crate::{ConfigError, StatsError, StatsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest TTL the read cache accepts. Shorter values are clamped up to this.
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(5);

/// Default TTL for cached stats and leaderboard snapshots.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Smallest leaderboard page fetched from the store on a cache miss.
pub const DEFAULT_LEADERBOARD_FETCH_FLOOR: usize = 10;

/// Default number of background store workers.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 2;

/// Identity reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// When a display name already exists, claim it for the incoming stable id.
    /// When false the first owner of a name keeps it.
    pub overwrite_id_on_name_collision: bool,
    /// When the incoming stable id is already stored under another name,
    /// rename that record to the incoming name.
    pub rename_on_id_match: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            overwrite_id_on_name_collision: true,
            rename_on_id_match: true,
        }
    }
}

/// Master configuration for the stats orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsConfig {
    /// TTL shared by the per-identity and leaderboard caches.
    /// Always at least [`MIN_CACHE_TTL`].
    cache_ttl: Duration,
    pub sync: SyncPolicy,
    pub leaderboard_fetch_floor: usize,
    pub worker_pool_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            sync: SyncPolicy::default(),
            leaderboard_fetch_floor: DEFAULT_LEADERBOARD_FETCH_FLOOR,
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

impl StatsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL, clamped to [`MIN_CACHE_TTL`].
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = clamp_ttl(ttl);
        self
    }

    pub fn with_sync_policy(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_leaderboard_fetch_floor(mut self, floor: usize) -> Self {
        self.leaderboard_fetch_floor = floor;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Validate the configuration.
    pub fn validate(&self) -> StatsResult<()> {
        if self.worker_pool_size == 0 {
            return Err(StatsError::Config(ConfigError::InvalidValue {
                field: "workers.pool_size".to_string(),
                value: self.worker_pool_size.to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        if self.leaderboard_fetch_floor == 0 {
            return Err(StatsError::Config(ConfigError::InvalidValue {
                field: "leaderboard.fetch_floor".to_string(),
                value: self.leaderboard_fetch_floor.to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        Ok(())
    }
}

/// Clamp a TTL to the [`MIN_CACHE_TTL`] floor.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.max(MIN_CACHE_TTL)
}
