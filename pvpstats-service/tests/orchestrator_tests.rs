//! Integration tests for the stats orchestrator over the in-memory repository.
//!
//! Tests use a single worker so background jobs run in submission order and
//! `flush()` gives a deterministic point to assert on.

use std::sync::Arc;

use pvpstats_core::{Rank, StableId, StatsConfig, SyncPolicy};
use pvpstats_service::{Participant, StatsOrchestrator};
use pvpstats_storage::{InMemoryStatsRepository, RepositoryOp};
use pvpstats_test_utils::fixtures::{ladder, record, seeded_repository, test_config, tie_board};
use pvpstats_test_utils::{assert_leaderboard_sorted, StatsRecord};

fn orchestrator(
    repo: &Arc<InMemoryStatsRepository>,
    config: StatsConfig,
) -> StatsOrchestrator<InMemoryStatsRepository> {
    StatsOrchestrator::new(Arc::clone(repo), config).unwrap()
}

fn find(repo: &InMemoryStatsRepository, name: &str) -> Option<StatsRecord> {
    repo.records().into_iter().find(|r| r.display_name == name)
}

// ============================================================================
// READS
// ============================================================================

#[tokio::test]
async fn test_get_stats_miss_then_hit() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    let first = stats.get_stats("alice");
    assert!(!first.is_ready());
    let alice = first.await.unwrap();
    assert_eq!(alice.kills, 10);

    let second = stats.get_stats("alice");
    assert!(second.is_ready());
    assert_eq!(second.await.unwrap(), alice);
    assert_eq!(repo.call_count(RepositoryOp::FindByName), 1);
    assert_eq!(stats.stats_cache_stats().hits, 1);
}

#[tokio::test]
async fn test_absent_player_is_not_cached() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    assert!(stats.get_stats("zed").await.is_none());
    assert!(!stats.get_stats("zed").is_ready());
}

#[tokio::test]
async fn test_blank_names_resolve_immediately() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    let blank_stats = stats.get_stats("   ");
    assert!(blank_stats.is_ready());
    assert!(blank_stats.await.is_none());

    let blank_rank = stats.get_rank("");
    assert!(blank_rank.is_ready());
    assert!(blank_rank.await.is_none());
    assert_eq!(repo.call_count(RepositoryOp::FindByName), 0);
    assert_eq!(repo.call_count(RepositoryOp::RankByKills), 0);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    let stale = record("alice", 1, 0);
    stats
        .cache()
        .stats()
        .put_at(stale, chrono::Utc::now() - chrono::Duration::seconds(61));

    let read = stats.get_stats("alice");
    assert!(!read.is_ready());
    assert_eq!(read.await.unwrap().kills, 10);
}

#[tokio::test]
async fn test_rank_breaks_ties_by_name() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    assert_eq!(stats.get_rank("alice").await, Some(Rank::FIRST));
    assert_eq!(stats.get_rank("bob").await, Rank::new(2));
    assert_eq!(stats.get_rank("carol").await, Rank::new(3));
    assert_eq!(stats.get_rank("nobody").await, None);
}

#[tokio::test]
async fn test_rank_is_never_cached() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    stats.get_rank("bob").await;
    assert!(!stats.get_rank("bob").is_ready());
}

#[tokio::test]
async fn test_leaderboard_fetches_at_least_the_floor() {
    let repo = seeded_repository(ladder(20));
    let stats = orchestrator(&repo, test_config());

    let entries = stats.get_leaderboard(3).await;
    assert_eq!(entries.len(), 10);
    assert_leaderboard_sorted(&entries);
    assert_eq!(entries[0].display_name, "player00");

    assert!(stats.get_leaderboard(10).is_ready());
    assert!(!stats.get_leaderboard(11).is_ready());
}

#[tokio::test]
async fn test_leaderboard_hit_requires_large_enough_fetch() {
    let repo = seeded_repository(ladder(20));
    let stats = orchestrator(&repo, test_config().with_leaderboard_fetch_floor(1));

    assert_eq!(stats.get_leaderboard(3).await.len(), 3);
    assert!(stats.get_leaderboard(3).is_ready());
    let larger = stats.get_leaderboard(5);
    assert!(!larger.is_ready());
    assert_eq!(larger.await.len(), 5);
    assert!(stats.get_leaderboard(5).is_ready());
}

#[tokio::test]
async fn test_empty_leaderboard_is_never_a_hit() {
    let repo = seeded_repository(Vec::new());
    let stats = orchestrator(&repo, test_config());

    assert!(stats.get_leaderboard(5).await.is_empty());
    assert!(!stats.get_leaderboard(5).is_ready());
}

// ============================================================================
// WRITES
// ============================================================================

#[tokio::test]
async fn test_kill_and_death_invalidate_before_returning() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    stats.get_stats("alice").await;
    stats.get_stats("bob").await;
    stats.get_leaderboard(3).await;
    assert!(stats.cache().stats().contains("alice"));

    stats.record_kill_and_death(Some("alice"), "bob");

    assert!(!stats.cache().stats().contains("alice"));
    assert!(!stats.cache().stats().contains("bob"));
    assert!(stats.cache().leaderboard().is_empty());

    // Queued behind the write, so it sees the post-event value.
    let alice = stats.get_stats("alice").await.unwrap();
    assert_eq!(alice.kills, 11);
    assert_eq!(alice.killstreak, 1);
    let bob = stats.get_stats("bob").await.unwrap();
    assert_eq!(bob.deaths, 5);
    assert_eq!(bob.killstreak, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_never_cache_pre_write_values() {
    let repo = seeded_repository([record("alice", 0, 0), record("bob", 0, 0)]);
    let stats = orchestrator(&repo, test_config().with_worker_pool_size(4));

    for round in 1..=200u32 {
        let before = stats.get_stats("alice");
        let board_before = stats.get_leaderboard(2);
        stats.record_kill_and_death(Some("alice"), "bob");
        let during = stats.get_stats("alice");
        let board_during = stats.get_leaderboard(2);
        stats.flush().await;

        let _ = (before.await, during.await, board_before.await, board_during.await);

        let alice = stats.get_stats("alice").await.unwrap();
        assert_eq!(alice.kills, round, "round {round}");
        // Whatever the reads above left cached must be post-write.
        let cached = stats.get_stats("alice");
        assert!(cached.is_ready());
        assert_eq!(cached.await.unwrap().kills, round, "round {round}");

        let board = stats.get_leaderboard(2).await;
        assert_eq!(board[0].display_name, "alice");
        assert_eq!(board[0].kills, round, "round {round}");
    }
    assert_eq!(stats.cache().stats().fetches_in_flight(), 0);
}

#[tokio::test]
async fn test_death_without_killer() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    stats.record_kill_and_death(None, "carol");
    stats.flush().await;

    let carol = find(&repo, "carol").unwrap();
    assert_eq!(carol.deaths, 6);
    assert_eq!(carol.kills, 5);
    assert_eq!(repo.call_count(RepositoryOp::IncrementKill), 0);
}

#[tokio::test]
async fn test_kill_then_death_resets_streak() {
    let repo = seeded_repository(Vec::new());
    let stats = orchestrator(&repo, test_config());
    let alice = StableId::generate();
    let bob = StableId::generate();

    stats.ensure_identity("alice", alice);
    stats.ensure_identity("bob", bob);
    stats.record_kill_and_death(Some("alice"), "bob");
    stats.record_kill_and_death(Some("alice"), "bob");
    stats.record_kill_and_death(Some("bob"), "alice");
    stats.flush().await;

    let alice = find(&repo, "alice").unwrap();
    assert_eq!((alice.kills, alice.deaths, alice.killstreak), (2, 1, 0));
    let bob = find(&repo, "bob").unwrap();
    assert_eq!((bob.kills, bob.deaths, bob.killstreak), (1, 2, 1));
}

#[tokio::test]
async fn test_ensure_identity_creates_zeroed_record() {
    let repo = seeded_repository(Vec::new());
    let stats = orchestrator(&repo, test_config());
    let id = StableId::generate();

    stats.ensure_identity("alice", id);
    stats.flush().await;

    let alice = find(&repo, "alice").unwrap();
    assert_eq!(alice, StatsRecord::new("alice", id));
}

#[tokio::test]
async fn test_name_change_renames_existing_record() {
    let id = StableId::generate();
    let seeded = StatsRecord {
        kills: 7,
        deaths: 3,
        killstreak: 2,
        ..StatsRecord::new("nick1", id)
    };
    let repo = seeded_repository([seeded]);
    let stats = orchestrator(&repo, test_config());

    stats.get_stats("nick1").await;
    stats.ensure_identity("nick2", id);
    stats.flush().await;

    let records = repo.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].display_name, "nick2");
    assert_eq!(records[0].stable_id, id);
    assert_eq!((records[0].kills, records[0].deaths, records[0].killstreak), (7, 3, 2));

    assert!(!stats.cache().stats().contains("nick1"));
    assert!(stats.get_stats("nick1").await.is_none());
    assert_eq!(stats.get_stats("nick2").await.unwrap().kills, 7);
}

#[tokio::test]
async fn test_name_change_without_rename_policy_keeps_old_record() {
    let id = StableId::generate();
    let repo = seeded_repository([StatsRecord::new("nick1", id)]);
    let config = test_config().with_sync_policy(SyncPolicy {
        overwrite_id_on_name_collision: true,
        rename_on_id_match: false,
    });
    let stats = orchestrator(&repo, config);

    stats.ensure_identity("nick2", id);
    stats.flush().await;

    let records = repo.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].display_name, "nick1");
    assert_eq!(repo.call_count(RepositoryOp::FindByStableId), 0);
}

#[tokio::test]
async fn test_name_collision_respects_overwrite_policy() {
    let original = StableId::generate();
    let newcomer = StableId::generate();

    let repo = seeded_repository([StatsRecord::new("alice", original)]);
    let keep = test_config().with_sync_policy(SyncPolicy {
        overwrite_id_on_name_collision: false,
        rename_on_id_match: true,
    });
    let stats = orchestrator(&repo, keep);
    stats.ensure_identity("alice", newcomer);
    stats.flush().await;
    assert_eq!(find(&repo, "alice").unwrap().stable_id, original);

    let repo = seeded_repository([StatsRecord::new("alice", original)]);
    let stats = orchestrator(&repo, test_config());
    stats.ensure_identity("alice", newcomer);
    stats.flush().await;
    assert_eq!(find(&repo, "alice").unwrap().stable_id, newcomer);
}

#[tokio::test]
async fn test_rename_onto_taken_name_is_contained() {
    let a = StableId::generate();
    let b = StableId::generate();
    let repo = seeded_repository([StatsRecord::new("nick1", a), StatsRecord::new("nick2", b)]);
    let keep = test_config().with_sync_policy(SyncPolicy {
        overwrite_id_on_name_collision: false,
        rename_on_id_match: true,
    });
    let stats = orchestrator(&repo, keep);

    // nick2 already belongs to b, so renaming a's record fails in the store.
    stats.ensure_identity("nick2", a);
    stats.flush().await;

    assert_eq!(find(&repo, "nick1").unwrap().stable_id, a);
    assert_eq!(find(&repo, "nick2").unwrap().stable_id, b);
    assert_eq!(repo.call_count(RepositoryOp::RenameByStableId), 1);
}

#[tokio::test]
async fn test_reconcile_lookup_failure_keeps_upsert() {
    let repo = seeded_repository(Vec::new());
    repo.fail_on(RepositoryOp::FindByStableId);
    let stats = orchestrator(&repo, test_config());

    stats.ensure_identity("newbie", StableId::generate());
    stats.flush().await;

    assert!(find(&repo, "newbie").is_some());
}

#[tokio::test]
async fn test_player_death_ensures_identities_first() {
    let repo = seeded_repository(Vec::new());
    let stats = orchestrator(&repo, test_config());
    let victim = Participant::new("bob", StableId::generate());
    let killer = Participant::new("alice", StableId::generate());

    stats.record_player_death(&victim, Some(&killer));
    stats.flush().await;

    let alice = find(&repo, "alice").unwrap();
    assert_eq!((alice.kills, alice.killstreak), (1, 1));
    assert_eq!(alice.stable_id, killer.stable_id);
    let bob = find(&repo, "bob").unwrap();
    assert_eq!(bob.deaths, 1);
    assert_eq!(bob.stable_id, victim.stable_id);
}

#[tokio::test]
async fn test_writes_for_unknown_names_are_no_ops() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    stats.record_kill_and_death(Some("ghost"), "phantom");
    stats.flush().await;

    assert_eq!(repo.len(), 3);
    assert!(find(&repo, "ghost").is_none());
}

// ============================================================================
// FAILURES AND LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_store_unavailable_yields_safe_defaults() {
    let repo = seeded_repository(tie_board());
    repo.set_unavailable(true);
    let stats = orchestrator(&repo, test_config());

    assert!(stats.get_stats("alice").await.is_none());
    assert!(stats.get_rank("alice").await.is_none());
    assert!(stats.get_leaderboard(5).await.is_empty());
    stats.record_kill_and_death(Some("alice"), "bob");
    stats.flush().await;

    repo.set_unavailable(false);
    assert_eq!(stats.get_stats("alice").await.unwrap().kills, 10);
    assert_eq!(stats.get_leaderboard(5).await.len(), 3);
}

#[tokio::test]
async fn test_failed_fetch_does_not_populate_cache() {
    let repo = seeded_repository(tie_board());
    repo.fail_on(RepositoryOp::FindByName);
    let stats = orchestrator(&repo, test_config());

    assert!(stats.get_stats("alice").await.is_none());
    assert!(!stats.cache().stats().contains("alice"));
}

#[tokio::test]
async fn test_reads_after_shutdown_resolve_to_defaults() {
    let repo = seeded_repository(tie_board());
    let stats = orchestrator(&repo, test_config());

    stats.get_stats("alice").await;
    stats.shutdown().await;

    // Cached values are still served; misses cannot be scheduled.
    assert!(stats.get_stats("alice").is_ready());
    let miss = stats.get_stats("bob");
    assert!(miss.is_ready());
    assert!(miss.await.is_none());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let repo = seeded_repository(Vec::new());
    let result = StatsOrchestrator::new(repo, StatsConfig::new().with_worker_pool_size(0));
    assert!(result.is_err());
}

// ============================================================================
// PROPERTIES
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;
    use pvpstats_test_utils::generators::arb_distinct_records;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_rank_agrees_with_leaderboard_position(records in arb_distinct_records(20)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let count = records.len();

            let (entries, ranks) = runtime.block_on(async {
                let repo = seeded_repository(records);
                let stats = orchestrator(&repo, test_config());
                let entries = stats.get_leaderboard(count.max(1)).await;
                let mut ranks = Vec::with_capacity(entries.len());
                for entry in &entries {
                    ranks.push(stats.get_rank(&entry.display_name).await);
                }
                stats.shutdown().await;
                (entries, ranks)
            });

            prop_assert_eq!(entries.len(), count);
            assert_leaderboard_sorted(&entries);
            for (position, rank) in ranks.into_iter().enumerate() {
                prop_assert_eq!(rank, Rank::new(position as u32 + 1));
            }
        }
    }
}
