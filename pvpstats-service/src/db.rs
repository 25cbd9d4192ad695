//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling through deadpool-postgres, the `pvp_stats`
//! schema bootstrap, and [`PgStatsRepository`], the production
//! [`StatsRepository`]. Every repository operation is a single SQL statement,
//! so each is atomic on its own and none spans a transaction.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use pvpstats_core::{
    LeaderboardEntry, Rank, StableId, StatsError, StatsRecord, StatsResult, StorageError,
};
use pvpstats_storage::{RepositoryOp, StatsRepository};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use crate::config::parse_var;
use crate::error::{ServiceError, ServiceResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait and connect timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "pvpstats".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 4,
            timeout: Duration::from_secs(10),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PVPSTATS_DB_HOST` (default: localhost)
    /// - `PVPSTATS_DB_PORT` (default: 5432)
    /// - `PVPSTATS_DB_NAME` (default: pvpstats)
    /// - `PVPSTATS_DB_USER` (default: postgres)
    /// - `PVPSTATS_DB_PASSWORD` (default: empty)
    /// - `PVPSTATS_DB_POOL_SIZE` (default: 4)
    /// - `PVPSTATS_DB_TIMEOUT` in seconds (default: 10)
    ///
    /// Numeric variables that are set but do not parse are rejected.
    pub fn from_env() -> ServiceResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("PVPSTATS_DB_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PVPSTATS_DB_PORT")?.unwrap_or(defaults.port),
            dbname: lookup("PVPSTATS_DB_NAME").unwrap_or(defaults.dbname),
            user: lookup("PVPSTATS_DB_USER").unwrap_or(defaults.user),
            password: lookup("PVPSTATS_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_var(&lookup, "PVPSTATS_DB_POOL_SIZE")?.unwrap_or(defaults.max_size),
            timeout: parse_var(&lookup, "PVPSTATS_DB_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ServiceResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size.max(1));
        pool_config.timeouts.wait = Some(self.timeout);
        pool_config.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ServiceError::pool_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pvp_stats (
    display_name TEXT PRIMARY KEY,
    stable_id    UUID NOT NULL UNIQUE,
    kills        INTEGER NOT NULL DEFAULT 0,
    deaths       INTEGER NOT NULL DEFAULT 0,
    killstreak   INTEGER NOT NULL DEFAULT 0,
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS pvp_stats_kills_idx
    ON pvp_stats (kills DESC, display_name COLLATE "C");
"#;

/// Create the `pvp_stats` table and its leaderboard index if absent.
pub async fn ensure_schema(pool: &Pool) -> ServiceResult<()> {
    let conn = pool.get().await?;
    conn.batch_execute(SCHEMA)
        .await
        .map_err(|e| ServiceError::database_error(format!("Failed to create schema: {}", e)))?;
    tracing::info!("pvp_stats schema ready");
    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

const SELECT_BY_NAME: &str = "SELECT display_name, stable_id, kills, deaths, killstreak \
     FROM pvp_stats WHERE display_name = $1";

const SELECT_BY_STABLE_ID: &str = "SELECT display_name, stable_id, kills, deaths, killstreak \
     FROM pvp_stats WHERE stable_id = $1";

// A conflict on either key skips the insert. The update then claims the id
// for an existing name only if the flag allows it and no other row holds it.
const UPSERT_IDENTITY: &str = r#"
WITH inserted AS (
    INSERT INTO pvp_stats (display_name, stable_id)
    VALUES ($1, $2)
    ON CONFLICT DO NOTHING
    RETURNING display_name
)
UPDATE pvp_stats
   SET stable_id = $2, updated_at = now()
 WHERE $3::boolean
   AND display_name = $1
   AND stable_id <> $2
   AND NOT EXISTS (SELECT 1 FROM inserted)
   AND NOT EXISTS (SELECT 1 FROM pvp_stats holder WHERE holder.stable_id = $2)
"#;

const RENAME_BY_STABLE_ID: &str = "UPDATE pvp_stats SET display_name = $2, updated_at = now() \
     WHERE stable_id = $1 AND display_name <> $2";

const INCREMENT_KILL: &str = "UPDATE pvp_stats \
     SET kills = kills + 1, killstreak = killstreak + 1, updated_at = now() \
     WHERE display_name = $1";

const INCREMENT_DEATH_RESET_STREAK: &str = "UPDATE pvp_stats \
     SET deaths = deaths + 1, killstreak = 0, updated_at = now() \
     WHERE display_name = $1";

const TOP_KILLS: &str = r#"
SELECT display_name, kills
  FROM pvp_stats
 ORDER BY kills DESC, display_name COLLATE "C" ASC
 LIMIT $1
"#;

const RANK_BY_KILLS: &str = r#"
SELECT (
    SELECT COUNT(*)
      FROM pvp_stats other
     WHERE other.kills > me.kills
        OR (other.kills = me.kills
            AND other.display_name COLLATE "C" < me.display_name COLLATE "C")
) AS ahead
  FROM pvp_stats me
 WHERE me.display_name = $1
"#;

// ============================================================================
// REPOSITORY
// ============================================================================

/// [`StatsRepository`] over the `pvp_stats` table.
#[derive(Clone)]
pub struct PgStatsRepository {
    pool: Pool,
}

impl PgStatsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self, op: RepositoryOp) -> StatsResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::unavailable(op.as_str(), e.to_string()).into())
    }
}

impl std::fmt::Debug for PgStatsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStatsRepository")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

/// Map a driver error to the storage taxonomy.
fn query_error(op: RepositoryOp) -> impl FnOnce(tokio_postgres::Error) -> StatsError {
    move |err| {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            let constraint = err
                .as_db_error()
                .and_then(|db| db.constraint())
                .unwrap_or("unique")
                .to_string();
            StorageError::ConstraintViolation {
                constraint,
                reason: err.to_string(),
            }
            .into()
        } else {
            StorageError::unavailable(op.as_str(), err.to_string()).into()
        }
    }
}

fn counter(row: &Row, column: &str, op: RepositoryOp) -> StatsResult<u32> {
    let value: i32 = row.try_get(column).map_err(query_error(op))?;
    Ok(u32::try_from(value).unwrap_or(0))
}

fn record_from_row(row: &Row, op: RepositoryOp) -> StatsResult<StatsRecord> {
    let display_name: String = row.try_get("display_name").map_err(query_error(op))?;
    let stable_id: Uuid = row.try_get("stable_id").map_err(query_error(op))?;
    Ok(StatsRecord {
        display_name,
        stable_id: StableId::new(stable_id),
        kills: counter(row, "kills", op)?,
        deaths: counter(row, "deaths", op)?,
        killstreak: counter(row, "killstreak", op)?,
    })
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    async fn find_by_name(&self, name: &str) -> StatsResult<Option<StatsRecord>> {
        const OP: RepositoryOp = RepositoryOp::FindByName;
        let conn = self.conn(OP).await?;
        let row = conn
            .query_opt(SELECT_BY_NAME, &[&name])
            .await
            .map_err(query_error(OP))?;
        row.map(|row| record_from_row(&row, OP)).transpose()
    }

    async fn find_by_stable_id(&self, id: StableId) -> StatsResult<Option<StatsRecord>> {
        const OP: RepositoryOp = RepositoryOp::FindByStableId;
        let conn = self.conn(OP).await?;
        let row = conn
            .query_opt(SELECT_BY_STABLE_ID, &[&id.as_uuid()])
            .await
            .map_err(query_error(OP))?;
        row.map(|row| record_from_row(&row, OP)).transpose()
    }

    async fn upsert_identity(
        &self,
        name: &str,
        id: StableId,
        overwrite_id_on_name_collision: bool,
    ) -> StatsResult<()> {
        const OP: RepositoryOp = RepositoryOp::UpsertIdentity;
        let conn = self.conn(OP).await?;
        conn.execute(
            UPSERT_IDENTITY,
            &[&name, &id.as_uuid(), &overwrite_id_on_name_collision],
        )
        .await
        .map_err(query_error(OP))?;
        Ok(())
    }

    async fn rename_by_stable_id(&self, id: StableId, new_name: &str) -> StatsResult<()> {
        const OP: RepositoryOp = RepositoryOp::RenameByStableId;
        let conn = self.conn(OP).await?;
        conn.execute(RENAME_BY_STABLE_ID, &[&id.as_uuid(), &new_name])
            .await
            .map_err(query_error(OP))?;
        Ok(())
    }

    async fn increment_kill(&self, name: &str) -> StatsResult<()> {
        const OP: RepositoryOp = RepositoryOp::IncrementKill;
        let conn = self.conn(OP).await?;
        conn.execute(INCREMENT_KILL, &[&name])
            .await
            .map_err(query_error(OP))?;
        Ok(())
    }

    async fn increment_death_reset_streak(&self, name: &str) -> StatsResult<()> {
        const OP: RepositoryOp = RepositoryOp::IncrementDeathResetStreak;
        let conn = self.conn(OP).await?;
        conn.execute(INCREMENT_DEATH_RESET_STREAK, &[&name])
            .await
            .map_err(query_error(OP))?;
        Ok(())
    }

    async fn top_kills(&self, limit: usize) -> StatsResult<Vec<LeaderboardEntry>> {
        const OP: RepositoryOp = RepositoryOp::TopKills;
        let conn = self.conn(OP).await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(TOP_KILLS, &[&limit])
            .await
            .map_err(query_error(OP))?;
        rows.iter()
            .map(|row| {
                let display_name: String =
                    row.try_get("display_name").map_err(query_error(OP))?;
                Ok(LeaderboardEntry::new(display_name, counter(row, "kills", OP)?))
            })
            .collect()
    }

    async fn rank_by_kills(&self, name: &str) -> StatsResult<Option<Rank>> {
        const OP: RepositoryOp = RepositoryOp::RankByKills;
        let conn = self.conn(OP).await?;
        let row = conn
            .query_opt(RANK_BY_KILLS, &[&name])
            .await
            .map_err(query_error(OP))?;
        match row {
            Some(row) => {
                let ahead: i64 = row.try_get("ahead").map_err(query_error(OP))?;
                Ok(Some(Rank::from_ahead(u64::try_from(ahead).unwrap_or(0))))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "pvpstats");
        assert_eq!(config.max_size, 4);
    }

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_db_config_from_lookup() {
        let config = DbConfig::from_lookup(lookup(&[
            ("PVPSTATS_DB_HOST", "db.internal"),
            ("PVPSTATS_DB_PORT", "6432"),
            ("PVPSTATS_DB_POOL_SIZE", "8"),
            ("PVPSTATS_DB_TIMEOUT", "3"),
        ]))
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6432);
        assert_eq!(config.max_size, 8);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.user, "postgres");
    }

    #[test]
    fn test_db_config_rejects_unparsable_numbers() {
        for vars in [
            &[("PVPSTATS_DB_PORT", "postgres")][..],
            &[("PVPSTATS_DB_PORT", "70000")][..],
            &[("PVPSTATS_DB_POOL_SIZE", "many")][..],
            &[("PVPSTATS_DB_TIMEOUT", "10s")][..],
        ] {
            let err = DbConfig::from_lookup(lookup(vars)).unwrap_err();
            assert!(
                matches!(err, ServiceError::Stats(StatsError::Config(_))),
                "{vars:?}: {err}"
            );
        }
    }

    #[test]
    fn test_create_pool_is_lazy() {
        // No connection is attempted until the first checkout.
        let pool = DbConfig::default().create_pool().unwrap();
        assert_eq!(pool.status().size, 0);
    }

    #[test]
    fn test_schema_declares_both_unique_keys() {
        assert!(SCHEMA.contains("display_name TEXT PRIMARY KEY"));
        assert!(SCHEMA.contains("stable_id    UUID NOT NULL UNIQUE"));
    }

    #[test]
    fn test_every_write_refreshes_updated_at() {
        for sql in [
            UPSERT_IDENTITY,
            RENAME_BY_STABLE_ID,
            INCREMENT_KILL,
            INCREMENT_DEATH_RESET_STREAK,
        ] {
            assert!(sql.contains("updated_at = now()"), "missing in: {sql}");
        }
    }
}
