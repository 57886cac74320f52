// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Bountyy Oy - Coordination Integration Tests
 * Multi-worker locking, request limiting and deduplication end to end
 *
 * @copyright 2026 Bountyy Oy
 * @license Proprietary
 */

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use lonkero_coordination::config::ResolverConfig;
use lonkero_coordination::resolver::{RecordType, StaticTransport};
use lonkero_coordination::store::{CoordinationStore, MemoryStore};
use lonkero_coordination::task_dedup::MemoryTaskStore;
use lonkero_coordination::{
    CoordinationError, Finding, LockManager, LockSettings, ReportDeduplicator, Resolver, Severity,
    Task, TaskDeduplicator, TargetRateLimiter,
};

fn settings() -> LockSettings {
    LockSettings {
        default_lease: Duration::from_secs(60),
        heartbeat_interval: Duration::from_secs(10),
        sleep_min: Duration::from_millis(100),
        sleep_max: Duration::from_millis(500),
    }
}

/// Each manager stands in for a separate worker process sharing one store
fn worker(store: &MemoryStore) -> LockManager {
    LockManager::new(Arc::new(store.clone()), settings())
}

#[tokio::test(start_paused = true)]
async fn test_two_workers_one_scan_lock() {
    let store = MemoryStore::new();
    let w1 = worker(&store);
    let w2 = worker(&store);
    let lease = Duration::from_secs(30);

    let started = tokio::time::Instant::now();
    let first = w1
        .acquire_expiring("scan:10.0.0.5", lease, Some(1))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(1));

    let second = w2
        .acquire_expiring("scan:10.0.0.5", lease, None)
        .await
        .unwrap();

    let waited = started.elapsed();
    assert!(waited >= lease);
    assert!(waited <= lease + Duration::from_millis(500));
    assert_ne!(first.holder_id(), second.holder_id());
}

#[tokio::test]
async fn test_concurrent_acquire_has_single_winner() {
    let store = MemoryStore::new();

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let manager = worker(&store);
            tokio::spawn(async move {
                manager
                    .acquire("lock-shared-target", Duration::from_secs(60), 1)
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, CoordinationError::LockUnavailable { .. })),
        }
    }

    assert_eq!(winners, 1);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_worker_lock_released_by_lease() {
    let store = MemoryStore::new();
    let alive = worker(&store);
    let _heartbeat = alive.spawn_heartbeat();

    // The crashed worker never refreshes
    let crashed = worker(&store);
    crashed
        .acquire("lock-a.example.com", Duration::from_secs(20), 1)
        .await
        .unwrap();
    let kept = alive
        .acquire("lock-b.example.com", Duration::from_secs(20), 1)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(45)).await;

    let other = worker(&store);
    assert!(other
        .acquire("lock-a.example.com", Duration::from_secs(20), 1)
        .await
        .is_ok());
    assert_eq!(
        store.get("lock-b.example.com").await.unwrap().as_deref(),
        Some(kept.holder_id())
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_shared_between_workers() {
    let store = MemoryStore::new();
    let transport = Arc::new(
        StaticTransport::new()
            .with_record("a.example.com", RecordType::A, "10.0.0.5")
            .with_record("b.example.com", RecordType::A, "10.0.0.5"),
    );
    let config = ResolverConfig {
        prefer_system_lookup: false,
        ..Default::default()
    };

    let limiter_1 = TargetRateLimiter::new(
        worker(&store),
        Arc::new(Resolver::new(transport.clone(), &config)),
        10,
        false,
    );
    let limiter_2 = TargetRateLimiter::new(
        worker(&store),
        Arc::new(Resolver::new(transport, &config)),
        10,
        false,
    );

    let started = tokio::time::Instant::now();
    limiter_1
        .limit_requests_for_target("https://a.example.com/")
        .await
        .unwrap();
    // Different name, same IP
    limiter_2
        .limit_requests_for_target("b.example.com")
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn test_task_dedup_across_workers() {
    let shared = Arc::new(MemoryTaskStore::new());
    let w1 = TaskDeduplicator::new(shared.clone());
    let w2 = TaskDeduplicator::new(shared.clone());

    let from_port_scan = Task::new("analysis-7")
        .with_header("type", "service")
        .with_header("origin", "port_scanner")
        .with_payload("host", "10.0.0.5")
        .with_payload("port", 443);
    let from_enumeration = Task::new("analysis-7")
        .with_header("type", "service")
        .with_header("origin", "subdomain_enum")
        .with_payload("port", 443)
        .with_payload("host", "10.0.0.5")
        .with_payload("last_domain", "a.example.com");

    assert!(w1.save_scheduled_task(&from_port_scan).await.unwrap());
    assert!(!w2.save_scheduled_task(&from_enumeration).await.unwrap());
    assert_eq!(shared.len(), 1);
}

#[tokio::test]
async fn test_annotated_findings_merge_across_representations() {
    let resolver = Resolver::new(
        Arc::new(StaticTransport::new().with_record("a.example.com", RecordType::A, "1.2.3.4")),
        &ResolverConfig {
            prefer_system_lookup: false,
            ..Default::default()
        },
    );
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    let mut sent = Finding::new("example.com", "http://a.example.com/", "open_port_remote_desktop", Severity::High)
        .with_timestamp(now - ChronoDuration::days(2));
    sent.annotate_target_ip(&resolver).await;

    let mut candidate = Finding::new("1.2.3.4", "http://1.2.3.4/", "open_port_remote_desktop", Severity::High);
    candidate.annotate_target_ip(&resolver).await;

    let dedup = ReportDeduplicator::default();
    assert!(dedup.deduplicate(&[sent], &[candidate], now).is_empty());
}
