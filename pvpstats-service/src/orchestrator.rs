//! Stats Orchestrator
//!
//! The only component callers talk to. It composes a [`StatsRepository`] with
//! the [`ReadCache`] and the [`WorkerPool`]:
//!
//! - Writes (`ensure_identity`, `record_kill_and_death`) are fire-and-forget.
//!   Cache entries they affect are invalidated before the job is queued and
//!   again once the store write has landed, so a read never caches a
//!   pre-write value for longer than the write itself takes.
//! - Reads (`get_stats`, `get_rank`, `get_leaderboard`) return a
//!   [`StatsFuture`] that is ready on a cache hit and otherwise resolves from a
//!   worker.
//!
//! Store failures stop at this boundary: they are logged by the worker pool
//! and the caller sees the safe default (absent stats, unranked, empty
//! leaderboard).

use std::sync::Arc;

use pvpstats_core::{
    LeaderboardEntry, Rank, StableId, StatsConfig, StatsRecord, StatsResult,
};
use pvpstats_storage::{CacheStats, ReadCache, StatsRepository};
use tokio::sync::oneshot;

use crate::future::StatsFuture;
use crate::workers::WorkerPool;

/// A player as seen by the event source: display name plus stable id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    pub name: String,
    pub stable_id: StableId,
}

impl Participant {
    pub fn new(name: impl Into<String>, stable_id: StableId) -> Self {
        Self {
            name: name.into(),
            stable_id,
        }
    }
}

struct Shared<R> {
    repo: Arc<R>,
    cache: ReadCache,
    config: StatsConfig,
}

/// Cache-fronted, worker-backed access to PvP stats.
pub struct StatsOrchestrator<R: StatsRepository> {
    shared: Arc<Shared<R>>,
    workers: Arc<WorkerPool>,
}

impl<R: StatsRepository> Clone for StatsOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            workers: Arc::clone(&self.workers),
        }
    }
}

impl<R: StatsRepository> StatsOrchestrator<R> {
    /// Validate `config` and start the worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(repo: Arc<R>, config: StatsConfig) -> StatsResult<Self> {
        config.validate()?;
        let cache = ReadCache::new(config.cache_ttl());
        let workers = WorkerPool::new(config.worker_pool_size);
        tracing::info!(
            cache_ttl_secs = config.cache_ttl().as_secs(),
            workers = config.worker_pool_size,
            leaderboard_fetch_floor = config.leaderboard_fetch_floor,
            "Stats orchestrator started"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                repo,
                cache,
                config,
            }),
            workers: Arc::new(workers),
        })
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.shared.repo
    }

    pub fn cache(&self) -> &ReadCache {
        &self.shared.cache
    }

    pub fn config(&self) -> &StatsConfig {
        &self.shared.config
    }

    pub fn stats_cache_stats(&self) -> CacheStats {
        self.shared.cache.stats().stats()
    }

    pub fn leaderboard_cache_stats(&self) -> CacheStats {
        self.shared.cache.leaderboard().stats()
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Reconcile `name` with `id` in the background.
    pub fn ensure_identity(&self, name: &str, id: StableId) {
        if is_blank(name) {
            tracing::debug!(%id, "Ignoring identity with blank display name");
            return;
        }
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.dispatch("ensure_identity", async move { shared.reconcile(&name, id).await });
    }

    /// Record one death and, if there was a killer, one kill.
    ///
    /// Both names and the leaderboard are invalidated before this returns.
    pub fn record_kill_and_death(&self, killer: Option<&str>, victim: &str) {
        let killer = killer.filter(|k| !is_blank(k)).map(str::to_string);
        let victim = (!is_blank(victim)).then(|| victim.to_string());
        if killer.is_none() && victim.is_none() {
            return;
        }
        self.shared.invalidate(victim.as_deref(), killer.as_deref());

        let shared = Arc::clone(&self.shared);
        self.dispatch("record_kill_and_death", async move {
            shared.apply_kill_and_death(killer.as_deref(), victim.as_deref()).await
        });
    }

    /// Ensure both participants' identities, then record the death, as one
    /// background job so the counters land on reconciled records.
    pub fn record_player_death(&self, victim: &Participant, killer: Option<&Participant>) {
        if is_blank(&victim.name) {
            tracing::debug!(victim = %victim.stable_id, "Ignoring death with blank victim name");
            return;
        }
        let killer = killer.filter(|k| !is_blank(&k.name)).cloned();
        let victim = victim.clone();
        self.shared.invalidate(
            Some(victim.name.as_str()),
            killer.as_ref().map(|k| k.name.as_str()),
        );

        let shared = Arc::clone(&self.shared);
        self.dispatch("record_player_death", async move {
            let victim_identity = shared.reconcile(&victim.name, victim.stable_id).await;
            let killer_identity = match &killer {
                Some(killer) => shared.reconcile(&killer.name, killer.stable_id).await,
                None => Ok(()),
            };
            if let Err(e) = &victim_identity {
                tracing::warn!(error = %e, victim = %victim.name, "Victim identity not reconciled before recording death");
            }
            if let Err(e) = &killer_identity {
                tracing::warn!(error = %e, "Killer identity not reconciled before recording death");
            }
            shared
                .apply_kill_and_death(
                    killer.as_ref().map(|k| k.name.as_str()),
                    Some(victim.name.as_str()),
                )
                .await
        });
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Current stats for `name`, cache first.
    pub fn get_stats(&self, name: &str) -> StatsFuture<Option<StatsRecord>> {
        const OP: &str = "get_stats";
        if is_blank(name) {
            return StatsFuture::ready(OP, None);
        }
        if let Some(read) = self.shared.cache.stats().get(name) {
            tracing::trace!(name, cached_at = %read.cached_at(), "Serving stats from cache");
            return StatsFuture::ready(OP, Some(read.into_value()));
        }

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.defer(OP, rx, async move {
            shared.fetch_stats(&name).await.map(|found| {
                let _ = tx.send(found);
            })
        })
    }

    /// 1-based kills rank of `name`, always from the store.
    pub fn get_rank(&self, name: &str) -> StatsFuture<Option<Rank>> {
        const OP: &str = "get_rank";
        if is_blank(name) {
            return StatsFuture::ready(OP, None);
        }

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let name = name.to_string();
        self.defer(OP, rx, async move {
            shared.repo.rank_by_kills(&name).await.map(|rank| {
                let _ = tx.send(rank);
            })
        })
    }

    /// Top-kills leaderboard able to serve `limit` positions.
    ///
    /// The result is the whole cached or fetched page, which holds up to
    /// `max(limit, leaderboard_fetch_floor)` entries.
    pub fn get_leaderboard(&self, limit: usize) -> StatsFuture<Vec<LeaderboardEntry>> {
        const OP: &str = "get_leaderboard";
        if let Some(read) = self.shared.cache.leaderboard().get(limit) {
            tracing::trace!(limit, cached_at = %read.cached_at(), "Serving leaderboard from cache");
            return StatsFuture::ready(OP, read.value().entries.clone());
        }

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        self.defer(OP, rx, async move {
            shared.fetch_leaderboard(limit).await.map(|entries| {
                let _ = tx.send(entries);
            })
        })
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Wait until every background job queued so far has finished.
    pub async fn flush(&self) {
        self.workers.flush().await;
    }

    /// Stop accepting jobs, drain the queue and join the workers.
    pub async fn shutdown(&self) {
        self.workers.shutdown().await;
    }

    fn dispatch<F>(&self, label: &'static str, job: F)
    where
        F: std::future::Future<Output = StatsResult<()>> + Send + 'static,
    {
        if let Err(e) = self.workers.submit(label, job) {
            tracing::warn!(job = label, error = %e, "Dropped stats write");
        }
    }

    fn defer<T, F>(
        &self,
        label: &'static str,
        rx: oneshot::Receiver<T>,
        job: F,
    ) -> StatsFuture<T>
    where
        T: Default,
        F: std::future::Future<Output = StatsResult<()>> + Send + 'static,
    {
        match self.workers.submit(label, job) {
            Ok(()) => StatsFuture::deferred(label, rx),
            Err(e) => {
                tracing::warn!(job = label, error = %e, "Stats read not scheduled");
                StatsFuture::ready(label, T::default())
            }
        }
    }
}

impl<R: StatsRepository> std::fmt::Debug for StatsOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsOrchestrator")
            .field("config", &self.shared.config)
            .field("workers", &self.workers)
            .finish()
    }
}

impl<R: StatsRepository> Shared<R> {
    fn invalidate(&self, victim: Option<&str>, killer: Option<&str>) {
        self.cache
            .invalidate_for_write(victim.into_iter().chain(killer));
    }

    /// Upsert the identity, then follow a stable-id match with a rename.
    ///
    /// Each step runs even if the previous one failed; the upsert error is
    /// returned, rename-side errors are only logged.
    async fn reconcile(&self, name: &str, id: StableId) -> StatsResult<()> {
        let policy = self.config.sync;
        let upserted = self
            .repo
            .upsert_identity(name, id, policy.overwrite_id_on_name_collision)
            .await;
        self.cache.invalidate_for_write([name]);

        if policy.rename_on_id_match {
            match self.repo.find_by_stable_id(id).await {
                Ok(Some(existing)) if existing.display_name != name => {
                    match self.repo.rename_by_stable_id(id, name).await {
                        Ok(()) => {
                            tracing::info!(
                                %id,
                                from = %existing.display_name,
                                to = name,
                                "Renamed stats record to new display name"
                            );
                            self.cache
                                .invalidate_for_write([existing.display_name.as_str(), name]);
                        }
                        Err(e) => {
                            tracing::warn!(%id, name, error = %e, "Rename on stable id match failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%id, name, error = %e, "Stable id lookup failed during reconciliation");
                }
            }
        }
        upserted
    }

    async fn apply_kill_and_death(
        &self,
        killer: Option<&str>,
        victim: Option<&str>,
    ) -> StatsResult<()> {
        let death = match victim {
            Some(victim) => self.repo.increment_death_reset_streak(victim).await,
            None => Ok(()),
        };
        let kill = match killer {
            Some(killer) => self.repo.increment_kill(killer).await,
            None => Ok(()),
        };
        // Drop anything a concurrent read cached while the writes were in flight.
        self.invalidate(victim, killer);

        match (death, kill) {
            (Err(death_err), Err(kill_err)) => {
                tracing::error!(error = %kill_err, killer, "Kill increment failed");
                Err(death_err)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn fetch_stats(&self, name: &str) -> StatsResult<Option<StatsRecord>> {
        let fetch = self.cache.stats().begin_fetch(name);
        let found = self.repo.find_by_name(name).await?;
        if let Some(record) = &found {
            self.cache.stats().put_fetched(fetch, record.clone());
        }
        Ok(found)
    }

    async fn fetch_leaderboard(&self, limit: usize) -> StatsResult<Vec<LeaderboardEntry>> {
        let fetch_limit = limit.max(self.config.leaderboard_fetch_floor);
        let ticket = self.cache.leaderboard().begin_fetch();
        let entries = self.repo.top_kills(fetch_limit).await?;
        let snapshot = self
            .cache
            .leaderboard()
            .store_fetched(ticket, entries, fetch_limit);
        Ok(snapshot.entries.clone())
    }
}

fn is_blank(name: &str) -> bool {
    name.trim().is_empty()
}
