//! In-memory stats repository.
//!
//! Mirrors the semantics of the PostgreSQL repository: display name is the
//! primary key, stable id is a unique secondary key, and every operation is
//! applied under one lock so it is atomic with respect to the others.
//! Faults can be injected per operation to exercise the orchestrator's
//! error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use pvpstats_core::{
    is_ahead, leaderboard_order, LeaderboardEntry, Rank, StableId, StatsRecord, StatsResult,
    StorageError,
};

use crate::{RepositoryOp, StatsRepository};

/// In-memory repository for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryStatsRepository {
    records: Arc<RwLock<BTreeMap<String, StatsRecord>>>,
    unavailable: AtomicBool,
    failing: Mutex<HashSet<RepositoryOp>>,
    calls: Mutex<HashMap<RepositoryOp, usize>>,
}

impl InMemoryStatsRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding the given records.
    pub fn with_records(records: impl IntoIterator<Item = StatsRecord>) -> StatsResult<Self> {
        let repo = Self::new();
        for record in records {
            repo.insert(record)?;
        }
        Ok(repo)
    }

    /// Insert a complete record, enforcing both unique keys.
    pub fn insert(&self, record: StatsRecord) -> StatsResult<()> {
        let mut records = self.write()?;
        if records.contains_key(&record.display_name) {
            return Err(name_taken(&record.display_name).into());
        }
        if records.values().any(|r| r.stable_id == record.stable_id) {
            return Err(id_taken(record.stable_id).into());
        }
        records.insert(record.display_name.clone(), record);
        Ok(())
    }

    /// Snapshot of every record, ordered by display name.
    pub fn records(&self) -> Vec<StatsRecord> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every operation fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make one operation fail as if the store were unreachable.
    pub fn fail_on(&self, op: RepositoryOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.set_unavailable(false);
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// How many times `op` has been invoked, failed calls included.
    pub fn call_count(&self, op: RepositoryOp) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn enter(&self, op: RepositoryOp) -> StatsResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(op).or_insert(0) += 1;
        }
        let injected = self
            .failing
            .lock()
            .map(|failing| failing.contains(&op))
            .unwrap_or(false);
        if injected || self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(op.as_str(), "injected fault").into());
        }
        Ok(())
    }

    fn read(
        &self,
    ) -> StatsResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, StatsRecord>>> {
        self.records
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(
        &self,
    ) -> StatsResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, StatsRecord>>> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }
}

fn name_taken(name: &str) -> StorageError {
    StorageError::ConstraintViolation {
        constraint: "pvp_stats_pkey".to_string(),
        reason: format!("display name {name} already exists"),
    }
}

fn id_taken(id: StableId) -> StorageError {
    StorageError::ConstraintViolation {
        constraint: "pvp_stats_stable_id_key".to_string(),
        reason: format!("stable id {id} already exists"),
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn find_by_name(&self, name: &str) -> StatsResult<Option<StatsRecord>> {
        self.enter(RepositoryOp::FindByName)?;
        Ok(self.read()?.get(name).cloned())
    }

    async fn find_by_stable_id(&self, id: StableId) -> StatsResult<Option<StatsRecord>> {
        self.enter(RepositoryOp::FindByStableId)?;
        Ok(self.read()?.values().find(|r| r.stable_id == id).cloned())
    }

    async fn upsert_identity(
        &self,
        name: &str,
        id: StableId,
        overwrite_id_on_name_collision: bool,
    ) -> StatsResult<()> {
        self.enter(RepositoryOp::UpsertIdentity)?;
        let mut records = self.write()?;

        let id_holder = records
            .values()
            .find(|r| r.stable_id == id)
            .map(|r| r.display_name.clone());

        match records.get_mut(name) {
            Some(existing) => {
                // The id may only move onto this name if no other record holds it.
                if overwrite_id_on_name_collision && id_holder.is_none() {
                    existing.stable_id = id;
                }
            }
            None => {
                if id_holder.is_none() {
                    records.insert(name.to_string(), StatsRecord::new(name, id));
                }
            }
        }
        Ok(())
    }

    async fn rename_by_stable_id(&self, id: StableId, new_name: &str) -> StatsResult<()> {
        self.enter(RepositoryOp::RenameByStableId)?;
        let mut records = self.write()?;

        let Some(current) = records
            .values()
            .find(|r| r.stable_id == id)
            .map(|r| r.display_name.clone())
        else {
            return Ok(());
        };
        if current == new_name {
            return Ok(());
        }
        if records.contains_key(new_name) {
            return Err(name_taken(new_name).into());
        }
        if let Some(mut record) = records.remove(&current) {
            record.display_name = new_name.to_string();
            records.insert(new_name.to_string(), record);
        }
        Ok(())
    }

    async fn increment_kill(&self, name: &str) -> StatsResult<()> {
        self.enter(RepositoryOp::IncrementKill)?;
        if let Some(record) = self.write()?.get_mut(name) {
            record.kills = record.kills.saturating_add(1);
            record.killstreak = record.killstreak.saturating_add(1);
        }
        Ok(())
    }

    async fn increment_death_reset_streak(&self, name: &str) -> StatsResult<()> {
        self.enter(RepositoryOp::IncrementDeathResetStreak)?;
        if let Some(record) = self.write()?.get_mut(name) {
            record.deaths = record.deaths.saturating_add(1);
            record.killstreak = 0;
        }
        Ok(())
    }

    async fn top_kills(&self, limit: usize) -> StatsResult<Vec<LeaderboardEntry>> {
        self.enter(RepositoryOp::TopKills)?;
        let records = self.read()?;
        let mut entries: Vec<LeaderboardEntry> =
            records.values().map(StatsRecord::leaderboard_entry).collect();
        entries.sort_by(|a, b| leaderboard_order(&a.display_name, a.kills, &b.display_name, b.kills));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn rank_by_kills(&self, name: &str) -> StatsResult<Option<Rank>> {
        self.enter(RepositoryOp::RankByKills)?;
        let records = self.read()?;
        let Some(me) = records.get(name) else {
            return Ok(None);
        };
        let ahead = records
            .values()
            .filter(|other| is_ahead(&other.display_name, other.kills, &me.display_name, me.kills))
            .count();
        Ok(Some(Rank::from_ahead(ahead as u64)))
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::collection::btree_map;
    use proptest::prelude::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// The rank of every record equals its 1-based position in the full
        /// leaderboard, so rank and top_kills agree on one total order.
        #[test]
        fn prop_rank_matches_leaderboard_position(
            players in btree_map("[a-zA-Z][a-zA-Z0-9_]{0,15}", 0u32..20, 1..30)
        ) {
            let repo = InMemoryStatsRepository::with_records(players.iter().map(|(name, kills)| {
                StatsRecord { kills: *kills, ..StatsRecord::new(name.as_str(), StableId::generate()) }
            })).unwrap();

            let board = block_on(repo.top_kills(players.len())).unwrap();
            prop_assert_eq!(board.len(), players.len());
            for (index, entry) in board.iter().enumerate() {
                let rank = block_on(repo.rank_by_kills(&entry.display_name)).unwrap();
                prop_assert_eq!(rank.map(|r| r.get()), Some(index as u32 + 1));
            }
        }

        /// Leaderboard kills never increase going down the list.
        #[test]
        fn prop_top_kills_is_sorted(
            players in btree_map("[a-z]{1,12}", 0u32..50, 0..40),
            limit in 0usize..50,
        ) {
            let repo = InMemoryStatsRepository::with_records(players.iter().map(|(name, kills)| {
                StatsRecord { kills: *kills, ..StatsRecord::new(name.as_str(), StableId::generate()) }
            })).unwrap();

            let board = block_on(repo.top_kills(limit)).unwrap();
            prop_assert!(board.len() <= limit);
            for pair in board.windows(2) {
                prop_assert!(is_ahead(&pair[0].display_name, pair[0].kills, &pair[1].display_name, pair[1].kills));
            }
        }
    }
}
