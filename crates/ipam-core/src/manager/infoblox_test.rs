//! Unit tests for the Infoblox manager, run against the in-memory grid

use super::*;
use crate::operation::ResourceRef;
use infoblox_client::MockInfobloxClient;

const LABELS: &str = r#"{"Dev": {"cidr": "172.16.4.0/29", "dnsView": "default.view"}}"#;

fn grid() -> MockInfobloxClient {
    let mock = MockInfobloxClient::new("https://gm:443/wapi/v2.11");
    mock.add_network_view("default");
    mock.add_network("default", "172.16.4.0/29");
    mock
}

async fn manager(mock: &MockInfobloxClient) -> InfobloxManager {
    InfobloxManager::new(Arc::new(mock.clone()), LABELS, "default")
        .await
        .unwrap()
}

fn owner() -> ResourceRef {
    ResourceRef::new("ipam", "kube-system")
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

#[test]
fn test_parse_labels_ignores_dns_view() {
    let labels = parse_labels(LABELS).unwrap();
    assert_eq!(labels["Dev"].cidr, "172.16.4.0/29");
    assert_eq!(labels["Dev"].net_view, None);
    assert!(parse_labels("{}").is_err());
    assert!(parse_labels("not json").is_err());
}

#[tokio::test]
async fn test_startup_creates_ea_definition() {
    let mock = grid();
    assert!(!mock.has_ea_definition(EA_NAME));
    manager(&mock).await;
    assert!(mock.has_ea_definition(EA_NAME));
}

#[tokio::test]
async fn test_startup_fails_for_missing_network() {
    let mock = MockInfobloxClient::new("https://gm:443/wapi/v2.11");
    mock.add_network_view("default");
    let result = InfobloxManager::new(Arc::new(mock), LABELS, "default").await;
    assert!(matches!(result, Err(ManagerError::Config(_))));
}

#[tokio::test]
async fn test_startup_fails_for_missing_view() {
    let mock = grid();
    let labels = r#"{"Dev": {"cidr": "172.16.4.0/29", "netView": "lab"}}"#;
    let result = InfobloxManager::new(Arc::new(mock), labels, "default").await;
    assert!(matches!(result, Err(ManagerError::Config(_))));
}

#[tokio::test]
async fn test_allocate_lookup_release() {
    let mock = grid();
    let manager = manager(&mock).await;
    let op = Operation::create(owner(), Some("foo.com"), None, "Dev");

    assert_eq!(manager.get_ip_address(&op).await.unwrap(), None);
    let addr = manager.allocate_next_ip_address(&op).await.unwrap();
    assert_eq!(addr, ip("172.16.4.1"));
    assert_eq!(manager.get_ip_address(&op).await.unwrap(), Some(addr));

    manager.create_dns_record(&op, addr).await.unwrap();
    assert_eq!(mock.records_a().len(), 1);

    manager.release_ip_address(&op, addr).await.unwrap();
    manager.delete_dns_record(&op, addr).await.unwrap();
    assert!(mock.fixed_addresses().is_empty());
    assert!(mock.records_a().is_empty());
    assert_eq!(manager.get_ip_address(&op).await.unwrap(), None);
}

#[tokio::test]
async fn test_allocate_exact_address() {
    let mock = grid();
    let manager = manager(&mock).await;
    let a = Operation::create(owner(), None, Some("a"), "Dev");
    let b = Operation::create(owner(), None, Some("b"), "Dev");

    manager.allocate_ip_address(&a, ip("172.16.4.5")).await.unwrap();
    // Replaying the same binding is a no-op
    manager.allocate_ip_address(&a, ip("172.16.4.5")).await.unwrap();
    assert_eq!(mock.fixed_addresses().len(), 1);

    assert!(matches!(
        manager.allocate_ip_address(&b, ip("172.16.4.5")).await,
        Err(ManagerError::Conflict { .. })
    ));
    assert!(matches!(
        manager.allocate_ip_address(&b, ip("10.0.0.1")).await,
        Err(ManagerError::InvalidAddress(_))
    ));
}

#[tokio::test]
async fn test_allocate_exact_refuses_second_address_for_reference() {
    let mock = grid();
    let manager = manager(&mock).await;
    let a = Operation::create(owner(), None, Some("a"), "Dev");

    let first = manager.allocate_next_ip_address(&a).await.unwrap();
    assert_eq!(first, ip("172.16.4.1"));
    assert!(matches!(
        manager.allocate_ip_address(&a, ip("172.16.4.5")).await,
        Err(ManagerError::Conflict { .. })
    ));
    let fixed = mock.fixed_addresses();
    assert_eq!(fixed.len(), 1);
    assert_eq!(fixed[0].ipv4addr, "172.16.4.1");

    // Releasing the one binding leaves nothing behind in the grid
    let bound = manager.get_ip_address(&a).await.unwrap().unwrap();
    manager.release_ip_address(&a, bound).await.unwrap();
    assert!(mock.fixed_addresses().is_empty());
}

#[tokio::test]
async fn test_headless_binding_gets_no_record() {
    let mock = grid();
    let manager = manager(&mock).await;
    let op = Operation::create(owner(), None, Some("ns/svc"), "Dev");
    let addr = manager.allocate_next_ip_address(&op).await.unwrap();
    manager.create_dns_record(&op, addr).await.unwrap();
    assert!(mock.records_a().is_empty());
}

#[tokio::test]
async fn test_unknown_label_and_remote_failure() {
    let mock = grid();
    let manager = manager(&mock).await;

    let op = Operation::create(owner(), Some("foo.com"), None, "Prod");
    assert!(matches!(
        manager.allocate_next_ip_address(&op).await,
        Err(ManagerError::UnknownPool(_))
    ));

    mock.set_failure(Some("grid unreachable"));
    let op = Operation::create(owner(), Some("foo.com"), None, "Dev");
    assert!(matches!(
        manager.allocate_next_ip_address(&op).await,
        Err(ManagerError::Infoblox(_))
    ));
}
