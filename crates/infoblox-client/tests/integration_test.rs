//! Integration tests for Infoblox client
//!
//! These tests require a reachable grid master.
//! Set INFOBLOX_HOST, INFOBLOX_USERNAME and INFOBLOX_PASSWORD to run;
//! INFOBLOX_CIDR must name an existing network in the default view.

use infoblox_client::{ext_attrs, HostConfig, InfobloxClient, InfobloxClientTrait};

fn client() -> InfobloxClient {
    let config = HostConfig {
        host: std::env::var("INFOBLOX_HOST").expect("INFOBLOX_HOST environment variable must be set"),
        version: std::env::var("INFOBLOX_WAPI_VERSION").unwrap_or_else(|_| "2.11".to_string()),
        port: std::env::var("INFOBLOX_WAPI_PORT").unwrap_or_else(|_| "443".to_string()),
        username: std::env::var("INFOBLOX_USERNAME").expect("INFOBLOX_USERNAME environment variable must be set"),
        password: std::env::var("INFOBLOX_PASSWORD").expect("INFOBLOX_PASSWORD environment variable must be set"),
        ssl_verify: false,
    };
    InfobloxClient::new(config).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running grid
async fn test_default_network_view_exists() {
    let client = client();
    let view = client.get_network_view("default").await
        .expect("Failed to query network views");
    assert!(view.is_some(), "default network view should exist");
}

#[tokio::test]
#[ignore]
async fn test_allocate_and_release_fixed_address() {
    let client = client();
    let cidr = std::env::var("INFOBLOX_CIDR").expect("INFOBLOX_CIDR environment variable must be set");
    let ea = ext_attrs("IPAM-CONTROLLER", "managed");

    let network = client.get_network("default", &cidr).await
        .expect("Failed to query network");
    assert!(network.is_some(), "network {} should exist", cidr);

    let addr = client
        .allocate_next_address("default", &cidr, "integration-test.example.com", &ea)
        .await
        .expect("Failed to allocate address");
    println!("Allocated {}", addr.ipv4addr);

    let found = client
        .query_fixed_addresses(&[("name", "integration-test.example.com")])
        .await
        .expect("Failed to query fixed addresses");
    assert!(found.iter().any(|a| a.ipv4addr == addr.ipv4addr));

    client.delete_object(&addr.reference).await
        .expect("Failed to delete fixed address");
}
