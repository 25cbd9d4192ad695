//! Service Configuration
//!
//! Loads [`StatsConfig`] and the log format from `PVPSTATS_*` environment
//! variables. Unset variables fall back to defaults; set but unparsable values
//! are rejected rather than silently ignored.

use std::str::FromStr;
use std::time::Duration;

use pvpstats_core::{ConfigError, StatsConfig, SyncPolicy};

use crate::error::ServiceResult;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                field: "PVPSTATS_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected \"json\" or \"compact\"".to_string(),
            }),
        }
    }
}

/// Everything the binary needs besides the database connection.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub stats: StatsConfig,
    pub log_format: LogFormat,
}

impl ServiceConfig {
    /// Create ServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PVPSTATS_CACHE_TTL_SECS`: read cache TTL, floored at 5 (default: 60)
    /// - `PVPSTATS_OVERWRITE_ID_ON_NAME_COLLISION`: "true" or "false" (default: true)
    /// - `PVPSTATS_RENAME_ON_ID_MATCH`: "true" or "false" (default: true)
    /// - `PVPSTATS_LEADERBOARD_FETCH_FLOOR`: minimum leaderboard fetch size (default: 10)
    /// - `PVPSTATS_WORKERS`: background worker count (default: 2)
    /// - `PVPSTATS_LOG_FORMAT`: "json" or "compact" (default: compact)
    pub fn from_env() -> ServiceResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StatsConfig::default();
        let mut stats = StatsConfig::new();

        if let Some(secs) = parse_var::<u64, _>(&lookup, "PVPSTATS_CACHE_TTL_SECS")? {
            stats = stats.with_cache_ttl(Duration::from_secs(secs));
        }

        let sync = SyncPolicy {
            overwrite_id_on_name_collision: parse_bool(
                &lookup,
                "PVPSTATS_OVERWRITE_ID_ON_NAME_COLLISION",
            )?
            .unwrap_or(defaults.sync.overwrite_id_on_name_collision),
            rename_on_id_match: parse_bool(&lookup, "PVPSTATS_RENAME_ON_ID_MATCH")?
                .unwrap_or(defaults.sync.rename_on_id_match),
        };
        stats = stats.with_sync_policy(sync);

        if let Some(floor) = parse_var::<usize, _>(&lookup, "PVPSTATS_LEADERBOARD_FETCH_FLOOR")? {
            stats = stats.with_leaderboard_fetch_floor(floor);
        }
        if let Some(workers) = parse_var::<usize, _>(&lookup, "PVPSTATS_WORKERS")? {
            stats = stats.with_worker_pool_size(workers);
        }
        stats.validate()?;

        let log_format = match lookup("PVPSTATS_LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self { stats, log_format })
    }
}

pub(crate) fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: "not a non-negative integer".to_string(),
            }),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}
