// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concurrency and expiry tests for the client cache.

use chrono::{TimeZone, Utc};
use futures::future::join_all;
use refinery_worker::{
    ActivityError, CachedClient, ClientCache, ManualClock, MockCloud, ResourceKind, WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> WorkerConfig {
    WorkerConfig::new("us-west-2", "REFINERY_ROLE")
}

#[tokio::test(start_paused = true)]
async fn test_stampede_on_one_key_assumes_once() {
    let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(50));
    let cache = ClientCache::new(&config(), cloud.clone());

    let fetches = (0..16).map(|_| cache.get_client(ResourceKind::Topic, "111122223333"));
    let results = join_all(fetches).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(cloud.assume_calls(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stampede_across_threads_assumes_once() {
    let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(20));
    let cache = Arc::new(ClientCache::new(&config(), cloud.clone()));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.queue_client("111122223333").await.is_ok() })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(cloud.assume_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_tenants_do_not_block_each_other() {
    let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(100));
    let cache = ClientCache::new(&config(), cloud.clone());
    let tenants: Vec<String> = (0..8).map(|i| format!("10000000000{i}")).collect();

    let start = tokio::time::Instant::now();
    let results = join_all(
        tenants
            .iter()
            .map(|tenant| cache.get_client(ResourceKind::Topic, tenant)),
    )
    .await;
    let elapsed = start.elapsed();

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(cloud.assume_calls(), 8);
    assert_eq!(cloud.max_concurrent_assumptions(), 8);
    // one assumption's worth of latency, not eight
    assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_distinct_kinds_do_not_block_each_other() {
    let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(100));
    let cache = ClientCache::new(&config(), cloud.clone());

    let kinds = [
        ResourceKind::ObjectStorage,
        ResourceKind::Topic,
        ResourceKind::Queue,
    ];
    let results = join_all(kinds.iter().map(|kind| cache.get_client(*kind, "111122223333"))).await;

    let clients: Vec<CachedClient> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(
        clients.iter().map(CachedClient::kind).collect::<Vec<_>>(),
        kinds.to_vec()
    );
    assert_eq!(cloud.max_concurrent_assumptions(), 3);
}

#[tokio::test]
async fn test_entry_past_ttl_is_never_returned() {
    let cloud = Arc::new(MockCloud::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    ));
    let config = config()
        .with_session_duration(Duration::from_secs(900))
        .with_cache_safety_margin(Duration::from_secs(300));
    let cache = ClientCache::with_clock(&config, cloud.clone(), clock.clone());

    cache.object_store("111122223333").await.unwrap();
    clock.advance(chrono::Duration::seconds(599));
    cache.object_store("111122223333").await.unwrap();
    assert_eq!(cloud.assume_calls(), 1);

    clock.advance(chrono::Duration::seconds(1));
    cache.object_store("111122223333").await.unwrap();
    assert_eq!(cloud.assume_calls(), 2);

    clock.advance(chrono::Duration::seconds(599));
    cache.object_store("111122223333").await.unwrap();
    assert_eq!(cloud.assume_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_are_not_cached() {
    let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(10));
    cloud.fail_assume_for("111122223333");
    let cache = ClientCache::new(&config(), cloud.clone());

    let results = join_all((0..4).map(|_| cache.topic_client("111122223333"))).await;
    for result in results {
        assert!(matches!(result, Err(ActivityError::Credentials { .. })));
    }
    assert!(cache.is_empty());

    cloud.allow_assume_for("111122223333");
    assert!(cache.topic_client("111122223333").await.is_ok());
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_one_tenant_failing_does_not_affect_another() {
    let cloud = Arc::new(MockCloud::new());
    cloud.fail_assume_for("999999999999");
    let cache = ClientCache::new(&config(), cloud.clone());

    assert!(cache.queue_client("999999999999").await.is_err());
    assert!(cache.queue_client("111122223333").await.is_ok());
    assert_eq!(
        cloud.assumed_tenants(),
        vec!["999999999999".to_string(), "111122223333".to_string()]
    );
}
