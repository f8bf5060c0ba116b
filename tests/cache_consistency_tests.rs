//! Rule cache freshness and consistency tests.
//!
//! Tests verify:
//! - Invalidation makes the next lookup reflect the store, even inside the TTL
//! - At most one store fetch per group per TTL window, regardless of volume
//! - Concurrent misses for one group are collapsed into a single fetch
//! - An invalidation racing an in-flight fetch never leaves stale rules cached
//! - TTL = 0 disables caching

use autoreply::{Engine, EngineConfig, MatchMode, MemoryRuleStore, Rule};
use std::sync::Arc;
use std::time::Duration;

const GROUP: i64 = 42;

fn setup(ttl_secs: u64, rules: Vec<Rule>) -> (Arc<MemoryRuleStore>, Arc<Engine>) {
    let store = Arc::new(MemoryRuleStore::with_rules(rules));
    let config = EngineConfig {
        cache_ttl_secs: ttl_secs,
        default_cooldown_secs: 0,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(store.clone(), config).expect("valid config"));
    (store, engine)
}

fn greeting(reply: &str) -> Rule {
    Rule::new(1, GROUP, MatchMode::Contains, "hi", reply)
}

// ============================================================================
// FRESHNESS
// ============================================================================

#[tokio::test]
async fn test_invalidate_reflects_latest_store_within_ttl() {
    let (store, engine) = setup(60, vec![greeting("old")]);

    let before = engine.resolve(GROUP, "hi", 0).await.unwrap();
    assert_eq!(before.reply_text.as_deref(), Some("old"));

    let change = store.edit(GROUP, 1, |r| r.reply = "new".to_string()).unwrap();

    // Without invalidation the cached snapshot is still served
    let cached = engine.resolve(GROUP, "hi", 1_000).await.unwrap();
    assert_eq!(cached.reply_text.as_deref(), Some("old"));

    engine.apply_change(&change);
    let after = engine.resolve(GROUP, "hi", 2_000).await.unwrap();
    assert_eq!(after.reply_text.as_deref(), Some("new"));
}

#[tokio::test]
async fn test_added_rule_visible_after_invalidate() {
    let (store, engine) = setup(60, vec![]);

    assert!(!engine.resolve(GROUP, "hi", 0).await.unwrap().fired);
    store.insert(greeting("welcome"));
    engine.invalidate_rules(GROUP);

    assert!(engine.resolve(GROUP, "hi", 1).await.unwrap().fired);
}

#[tokio::test]
async fn test_removed_rule_stops_firing_after_invalidate() {
    let (store, engine) = setup(60, vec![greeting("bye soon")]);

    assert!(engine.resolve(GROUP, "hi", 0).await.unwrap().fired);
    let change = store.remove(GROUP, 1).unwrap();
    engine.apply_change(&change);
    assert!(!engine.resolve(GROUP, "hi", 1).await.unwrap().fired);
}

#[tokio::test]
async fn test_invalidation_is_per_group() {
    let other = GROUP + 1;
    let (store, engine) = setup(
        60,
        vec![
            greeting("a"),
            Rule::new(2, other, MatchMode::Contains, "hi", "b"),
        ],
    );

    engine.resolve(GROUP, "hi", 0).await.unwrap();
    engine.resolve(other, "hi", 0).await.unwrap();
    engine.invalidate_rules(GROUP);

    engine.resolve(GROUP, "hi", 1).await.unwrap();
    engine.resolve(other, "hi", 1).await.unwrap();
    assert_eq!(store.fetch_count_for(GROUP), 2);
    assert_eq!(store.fetch_count_for(other), 1);
}

// ============================================================================
// FETCH BOUND
// ============================================================================

#[tokio::test]
async fn test_at_most_one_fetch_per_ttl_window() {
    let (store, engine) = setup(10, vec![greeting("x")]);

    for i in 0..1_000u64 {
        engine.resolve(GROUP, "hi", i * 9).await.unwrap();
    }
    assert_eq!(store.fetch_count_for(GROUP), 1, "All within the first 10s window");

    engine.resolve(GROUP, "hi", 10_000).await.unwrap();
    assert_eq!(store.fetch_count_for(GROUP), 2);

    let metrics = engine.stats().metrics;
    assert_eq!(metrics.cache_misses, 2);
    assert_eq!(metrics.cache_hits, 999);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_single_flight() {
    let (store, engine) = setup(60, vec![greeting("x")]);
    store.set_fetch_delay(Some(Duration::from_millis(50)));

    let mut handles = vec![];
    for _ in 0..32 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.cache().get_at(GROUP, 0).await.map(|s| s.len())
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
    assert_eq!(store.fetch_count_for(GROUP), 1);
}

#[tokio::test]
async fn test_zero_ttl_fetches_every_time() {
    let (store, engine) = setup(0, vec![greeting("x")]);

    for i in 0..5 {
        engine.resolve(GROUP, "hi", i).await.unwrap();
    }
    assert_eq!(store.fetch_count_for(GROUP), 5);
    assert_eq!(engine.stats().cache.entries, 0);
}

// ============================================================================
// RACES
// ============================================================================

#[tokio::test]
async fn test_invalidate_during_fetch_discards_stale_snapshot() {
    let (store, engine) = setup(60, vec![greeting("old")]);
    store.set_fetch_delay(Some(Duration::from_millis(100)));

    let in_flight = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.resolve(GROUP, "hi", 0).await })
    };

    // Let the fetch read the old rules and start waiting
    tokio::time::sleep(Duration::from_millis(30)).await;
    let change = store.edit(GROUP, 1, |r| r.reply = "new".to_string()).unwrap();
    engine.apply_change(&change);

    let raced = in_flight.await.unwrap().unwrap();
    assert_eq!(raced.reply_text.as_deref(), Some("old"));
    assert!(
        engine.cache().peek(GROUP).is_none(),
        "Snapshot fetched before the invalidation must not be installed"
    );
    assert_eq!(engine.stats().metrics.snapshots_discarded, 1);

    store.set_fetch_delay(None);
    let fresh = engine.resolve(GROUP, "hi", 1).await.unwrap();
    assert_eq!(fresh.reply_text.as_deref(), Some("new"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_edits_and_resolves_converge() {
    let (store, engine) = setup(60, vec![greeting("v0")]);
    store.set_fetch_delay(Some(Duration::from_millis(1)));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                for i in 0..50u64 {
                    engine.resolve(GROUP, "hi", i).await.unwrap();
                }
            })
        })
        .collect();

    for version in 1..=20 {
        let change = store
            .edit(GROUP, 1, |r| r.reply = format!("v{}", version))
            .unwrap();
        engine.apply_change(&change);
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }

    let last = engine.resolve(GROUP, "hi", 100).await.unwrap();
    assert_eq!(last.reply_text.as_deref(), Some("v20"));
}
