//! Unit tests for the coordinator

use super::*;
use crate::manager::LocalPoolManager;
use crate::operation::ResourceRef;
use crate::store::{AddressStatus, PoolStore};

fn local(ranges: &str) -> Arc<LocalPoolManager> {
    let (manager, _) = LocalPoolManager::with_store(PoolStore::open_in_memory().unwrap(), ranges).unwrap();
    Arc::new(manager)
}

fn owner() -> ResourceRef {
    ResourceRef::new("ipam", "kube-system")
}

fn key(k: &str, pool: &str) -> Operation {
    Operation::create(owner(), None, Some(k), pool)
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_exhaust_release_reuse() {
    let coordinator = Coordinator::new(local(r#"{"dev": "10.0.0.1-10.0.0.2"}"#));

    let a = coordinator.process(key("a", "dev")).await;
    assert!(a.succeeded);
    assert_eq!(a.address, Some(ip("10.0.0.1")));

    let b = coordinator.process(key("b", "dev")).await;
    assert_eq!(b.address, Some(ip("10.0.0.2")));

    let c = coordinator.process(key("c", "dev")).await;
    assert!(!c.succeeded);
    assert_eq!(c.address, None);

    let del = coordinator
        .process(Operation::delete(owner(), None, Some("a"), "dev"))
        .await;
    assert!(del.succeeded);
    assert_eq!(del.address, None);

    let c = coordinator.process(key("c", "dev")).await;
    assert!(c.succeeded);
    assert_eq!(c.address, Some(ip("10.0.0.1")));
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let manager = local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#);
    let coordinator = Coordinator::new(manager.clone());

    let first = coordinator.process(key("a", "dev")).await;
    let second = coordinator.process(key("a", "dev")).await;
    assert_eq!(first.address, second.address);

    let allocated = manager
        .store()
        .entries("dev")
        .unwrap()
        .into_iter()
        .filter(|e| e.status == AddressStatus::Allocated)
        .count();
    assert_eq!(allocated, 1);
}

#[tokio::test]
async fn test_delete_of_unknown_binding_succeeds() {
    let coordinator = Coordinator::new(local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#));
    let result = coordinator
        .process(Operation::delete(owner(), Some("ghost.com"), None, "dev"))
        .await;
    assert!(result.succeeded);
    assert_eq!(result.address, None);
}

#[tokio::test]
async fn test_release_gives_fresh_reference() {
    let manager = local(r#"{"dev": "10.0.0.1-10.0.0.1"}"#);
    let coordinator = Coordinator::new(manager.clone());

    coordinator.process(key("a", "dev")).await;
    coordinator
        .process(Operation::delete(owner(), None, Some("a"), "dev"))
        .await;

    let entry = manager.store().entry("dev", ip("10.0.0.1")).unwrap().unwrap();
    assert_eq!(entry.status, AddressStatus::Available);
    assert_ne!(entry.reference, "a");

    let b = coordinator.process(key("b", "dev")).await;
    assert_eq!(b.address, Some(ip("10.0.0.1")));
}

#[tokio::test]
async fn test_pool_isolation() {
    let coordinator = Coordinator::new(local(
        r#"{"a": "10.0.0.1-10.0.0.1", "b": "10.0.1.1-10.0.1.2"}"#,
    ));
    assert_eq!(coordinator.process(key("x", "a")).await.address, Some(ip("10.0.0.1")));
    assert!(!coordinator.process(key("y", "a")).await.succeeded);
    assert_eq!(coordinator.process(key("y", "b")).await.address, Some(ip("10.0.1.1")));
}

#[tokio::test]
async fn test_replay_preserves_binding() {
    let coordinator = Coordinator::new(local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#));
    let replay = Operation::replay(owner(), Some("h1"), None, "dev", "10.0.0.3");
    let replayed = coordinator.process(replay).await;
    assert!(replayed.succeeded);
    assert_eq!(replayed.address, Some(ip("10.0.0.3")));

    // The live desired set follows and must not allocate a second slot
    let live = coordinator
        .process(Operation::create(owner(), Some("h1"), None, "dev"))
        .await;
    assert_eq!(live.address, Some(ip("10.0.0.3")));
}

#[tokio::test]
async fn test_replay_conflict_fails() {
    let coordinator = Coordinator::new(local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#));
    coordinator.process(key("a", "dev")).await;

    let result = coordinator
        .process(Operation::replay(owner(), None, Some("b"), "dev", "10.0.0.1"))
        .await;
    assert!(!result.succeeded);

    let result = coordinator
        .process(Operation::replay(owner(), None, Some("b"), "dev", "not-an-ip"))
        .await;
    assert!(!result.succeeded);
}

#[tokio::test]
async fn test_invalid_requests_fail_without_touching_store() {
    let coordinator = Coordinator::new(local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#));
    assert!(!coordinator.process(Operation::create(owner(), None, None, "dev")).await.succeeded);
    assert!(!coordinator.process(key("a", "")).await.succeeded);
    assert!(!coordinator.process(key("a", "unknown")).await.succeeded);
}

#[tokio::test]
async fn test_host_binding_creates_and_removes_dns_record() {
    let manager = local(r#"{"dev": "10.0.0.1-10.0.0.5"}"#);
    let coordinator = Coordinator::new(manager.clone());

    coordinator
        .process(Operation::create(owner(), Some("foo.com"), None, "dev"))
        .await;
    assert_eq!(
        manager.store().dns_records("dev").unwrap(),
        vec![("foo.com".to_string(), ip("10.0.0.1"))]
    );

    coordinator
        .process(Operation::delete(owner(), Some("foo.com"), None, "dev"))
        .await;
    assert!(manager.store().dns_records("dev").unwrap().is_empty());
}

#[tokio::test]
async fn test_spawned_loop_preserves_arrival_order_and_drains() {
    let (requests, mut results, handle) = spawn(local(r#"{"dev": "10.0.0.1-10.0.0.3"}"#), 1);

    let producer = tokio::spawn(async move {
        for k in ["a", "b", "c", "d"] {
            requests.send(key(k, "dev")).await.unwrap();
        }
    });

    let mut seen = Vec::new();
    while let Some(result) = results.recv().await {
        seen.push((result.operation.key.clone().unwrap(), result.address));
    }
    producer.await.unwrap();
    handle.await.unwrap();

    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Some(ip("10.0.0.1"))),
            ("b".to_string(), Some(ip("10.0.0.2"))),
            ("c".to_string(), Some(ip("10.0.0.3"))),
            ("d".to_string(), None),
        ]
    );
}

#[tokio::test]
async fn test_loop_keeps_applying_after_result_receiver_is_dropped() {
    let manager = local(r#"{"dev": "10.0.0.1-10.0.0.3"}"#);
    let (requests, results, handle) = spawn(manager.clone(), 4);
    drop(results);

    requests.send(key("a", "dev")).await.unwrap();
    requests.send(key("b", "dev")).await.unwrap();
    drop(requests);
    handle.await.unwrap();

    assert_eq!(manager.store().lookup("dev", "b").unwrap(), Some(ip("10.0.0.2")));
}
