//! Mock InfobloxClient for unit testing
//!
//! This module provides a mock implementation of InfobloxClientTrait that can be used
//! in unit tests without requiring a running grid.
//!
//! The mock keeps network views, networks, fixed addresses and A records in
//! memory and hands out the lowest free host address of a network, the way
//! `func:nextavailableip` does.

use crate::error::InfobloxError;
use crate::infoblox_trait::InfobloxClientTrait;
use crate::models::*;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Mock InfobloxClient for testing
#[derive(Clone, Debug)]
pub struct MockInfobloxClient {
    pub(crate) base_url: String,
    pub(crate) network_views: Arc<Mutex<HashSet<String>>>,
    pub(crate) networks: Arc<Mutex<HashMap<(String, String), Network>>>,
    pub(crate) ea_definitions: Arc<Mutex<HashMap<String, EaDefinition>>>,
    pub(crate) fixed_addresses: Arc<Mutex<BTreeMap<String, FixedAddress>>>,
    pub(crate) records_a: Arc<Mutex<BTreeMap<String, RecordA>>>,
    /// When set, every call fails with this message
    pub(crate) failure: Arc<Mutex<Option<String>>>,
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl MockInfobloxClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            network_views: Arc::new(Mutex::new(HashSet::new())),
            networks: Arc::new(Mutex::new(HashMap::new())),
            ea_definitions: Arc::new(Mutex::new(HashMap::new())),
            fixed_addresses: Arc::new(Mutex::new(BTreeMap::new())),
            records_a: Arc::new(Mutex::new(BTreeMap::new())),
            failure: Arc::new(Mutex::new(None)),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add a network view (for test setup)
    pub fn add_network_view(&self, name: &str) {
        self.network_views.lock().unwrap().insert(name.to_string());
    }

    /// Add a network inside a view (for test setup)
    pub fn add_network(&self, network_view: &str, cidr: &str) {
        let id = self.next_id();
        self.networks.lock().unwrap().insert(
            (network_view.to_string(), cidr.to_string()),
            Network {
                reference: format!("network/{}:{}/{}", id, cidr, network_view),
                network: cidr.to_string(),
                network_view: network_view.to_string(),
            },
        );
    }

    /// Make every subsequent call fail (or succeed again with `None`)
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Snapshot of all fixed addresses
    pub fn fixed_addresses(&self) -> Vec<FixedAddress> {
        self.fixed_addresses.lock().unwrap().values().cloned().collect()
    }

    /// Snapshot of all A records
    pub fn records_a(&self) -> Vec<RecordA> {
        self.records_a.lock().unwrap().values().cloned().collect()
    }

    /// Whether an EA definition with this name exists
    pub fn has_ea_definition(&self, name: &str) -> bool {
        self.ea_definitions.lock().unwrap().contains_key(name)
    }

    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    fn check_failure(&self) -> Result<(), InfobloxError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(InfobloxError::Api(message.clone())),
            None => Ok(()),
        }
    }

    fn insert_fixed_address(&self, network_view: &str, ipv4addr: Ipv4Addr, name: &str) -> FixedAddress {
        let id = self.next_id();
        let addr = FixedAddress {
            reference: format!("fixedaddress/{}:{}/{}", id, ipv4addr, network_view),
            ipv4addr: ipv4addr.to_string(),
            name: name.to_string(),
            network_view: network_view.to_string(),
        };
        self.fixed_addresses
            .lock()
            .unwrap()
            .insert(addr.reference.clone(), addr.clone());
        addr
    }

    fn is_taken(&self, network_view: &str, ipv4addr: &str) -> bool {
        self.fixed_addresses
            .lock()
            .unwrap()
            .values()
            .any(|a| a.network_view == network_view && a.ipv4addr == ipv4addr)
    }
}

/// Network usable for host addresses; /31 and /32 have none
fn host_network(cidr: &str) -> Option<Ipv4Net> {
    let net = cidr.parse::<Ipv4Net>().ok()?.trunc();
    (net.prefix_len() <= 30).then_some(net)
}

/// Whether `ipv4addr` is a host address of `cidr`
fn in_cidr(cidr: &str, ipv4addr: &str) -> bool {
    match (host_network(cidr), ipv4addr.parse::<Ipv4Addr>()) {
        (Some(net), Ok(ip)) => net.contains(&ip) && ip != net.network() && ip != net.broadcast(),
        _ => false,
    }
}

#[async_trait::async_trait]
impl InfobloxClientTrait for MockInfobloxClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_network_view(&self, name: &str) -> Result<Option<NetworkView>, InfobloxError> {
        self.check_failure()?;
        Ok(self.network_views.lock().unwrap().get(name).map(|n| NetworkView {
            reference: format!("networkview/{}", n),
            name: n.clone(),
            is_default: n == "default",
        }))
    }

    async fn get_network(&self, network_view: &str, cidr: &str) -> Result<Option<Network>, InfobloxError> {
        self.check_failure()?;
        Ok(self
            .networks
            .lock()
            .unwrap()
            .get(&(network_view.to_string(), cidr.to_string()))
            .cloned())
    }

    async fn get_ea_definition(&self, name: &str) -> Result<Option<EaDefinition>, InfobloxError> {
        self.check_failure()?;
        Ok(self.ea_definitions.lock().unwrap().get(name).cloned())
    }

    async fn create_ea_definition(&self, definition: &EaDefinition) -> Result<String, InfobloxError> {
        self.check_failure()?;
        let reference = format!("extensibleattributedef/{}:{}", self.next_id(), definition.name);
        let mut stored = definition.clone();
        stored.reference = Some(reference.clone());
        self.ea_definitions
            .lock()
            .unwrap()
            .insert(definition.name.clone(), stored);
        Ok(reference)
    }

    async fn allocate_next_address(
        &self,
        network_view: &str,
        cidr: &str,
        name: &str,
        _ea: &ExtAttrs,
    ) -> Result<FixedAddress, InfobloxError> {
        self.check_failure()?;
        if self.get_network(network_view, cidr).await?.is_none() {
            return Err(InfobloxError::NotFound(format!(
                "network {} in view {}",
                cidr, network_view
            )));
        }
        let net = host_network(cidr)
            .ok_or_else(|| InfobloxError::InvalidRequest(format!("invalid network {}", cidr)))?;
        let free = net
            .hosts()
            .find(|ip| !self.is_taken(network_view, &ip.to_string()))
            .ok_or_else(|| InfobloxError::Api(format!("No available IP addresses in {}", cidr)))?;
        Ok(self.insert_fixed_address(network_view, free, name))
    }

    async fn create_fixed_address(
        &self,
        network_view: &str,
        ipv4addr: &str,
        name: &str,
        _ea: &ExtAttrs,
    ) -> Result<FixedAddress, InfobloxError> {
        self.check_failure()?;
        let ip: Ipv4Addr = ipv4addr
            .parse()
            .map_err(|_| InfobloxError::InvalidRequest(format!("invalid address {}", ipv4addr)))?;
        let covered = self
            .networks
            .lock()
            .unwrap()
            .values()
            .any(|n| n.network_view == network_view && in_cidr(&n.network, ipv4addr));
        if !covered {
            return Err(InfobloxError::InvalidRequest(format!(
                "address {} is not in any network of view {}",
                ipv4addr, network_view
            )));
        }
        if self.is_taken(network_view, ipv4addr) {
            return Err(InfobloxError::Api(format!(
                "fixed address {} already exists",
                ipv4addr
            )));
        }
        Ok(self.insert_fixed_address(network_view, ip, name))
    }

    async fn query_fixed_addresses(&self, filters: &[(&str, &str)]) -> Result<Vec<FixedAddress>, InfobloxError> {
        self.check_failure()?;
        let mut results = self.fixed_addresses();
        for (key, value) in filters {
            match *key {
                "name" => results.retain(|a| a.name == *value),
                "ipv4addr" => results.retain(|a| a.ipv4addr == *value),
                "network_view" => results.retain(|a| a.network_view == *value),
                "network" => results.retain(|a| in_cidr(value, &a.ipv4addr)),
                _ => {}
            }
        }
        Ok(results)
    }

    async fn create_record_a(&self, name: &str, ipv4addr: &str, _ea: &ExtAttrs) -> Result<RecordA, InfobloxError> {
        self.check_failure()?;
        let id = self.next_id();
        let record = RecordA {
            reference: format!("record:a/{}:{}/default", id, name),
            name: name.to_string(),
            ipv4addr: ipv4addr.to_string(),
            view: "default".to_string(),
        };
        self.records_a
            .lock()
            .unwrap()
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn query_records_a(&self, filters: &[(&str, &str)]) -> Result<Vec<RecordA>, InfobloxError> {
        self.check_failure()?;
        let mut results = self.records_a();
        for (key, value) in filters {
            match *key {
                "name" => results.retain(|r| r.name == *value),
                "ipv4addr" => results.retain(|r| r.ipv4addr == *value),
                _ => {}
            }
        }
        Ok(results)
    }

    async fn delete_object(&self, reference: &str) -> Result<(), InfobloxError> {
        self.check_failure()?;
        let removed = self.fixed_addresses.lock().unwrap().remove(reference).is_some()
            || self.records_a.lock().unwrap().remove(reference).is_some();
        if removed {
            Ok(())
        } else {
            Err(InfobloxError::NotFound(reference.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_next_skips_taken_addresses() {
        let mock = MockInfobloxClient::new("https://gm/wapi/v2.11");
        mock.add_network_view("default");
        mock.add_network("default", "172.16.4.0/29");
        let ea = ExtAttrs::new();

        let first = mock.allocate_next_address("default", "172.16.4.0/29", "a", &ea).await.unwrap();
        let second = mock.allocate_next_address("default", "172.16.4.0/29", "b", &ea).await.unwrap();
        assert_eq!(first.ipv4addr, "172.16.4.1");
        assert_eq!(second.ipv4addr, "172.16.4.2");

        mock.delete_object(&first.reference).await.unwrap();
        let third = mock.allocate_next_address("default", "172.16.4.0/29", "c", &ea).await.unwrap();
        assert_eq!(third.ipv4addr, "172.16.4.1");
    }

    #[tokio::test]
    async fn test_create_fixed_address_rejects_duplicates() {
        let mock = MockInfobloxClient::new("https://gm/wapi/v2.11");
        mock.add_network("default", "10.0.0.0/24");
        let ea = ExtAttrs::new();

        mock.create_fixed_address("default", "10.0.0.7", "a", &ea).await.unwrap();
        assert!(mock.create_fixed_address("default", "10.0.0.7", "b", &ea).await.is_err());
        assert!(mock.create_fixed_address("default", "10.0.1.7", "b", &ea).await.is_err());
    }

    #[tokio::test]
    async fn test_host_addresses_only() {
        let mock = MockInfobloxClient::new("https://gm/wapi/v2.11");
        mock.add_network("default", "10.0.0.0/30");
        let ea = ExtAttrs::new();

        assert!(mock.create_fixed_address("default", "10.0.0.0", "a", &ea).await.is_err());
        assert!(mock.create_fixed_address("default", "10.0.0.3", "a", &ea).await.is_err());

        let mut hosts = Vec::new();
        for name in ["a", "b"] {
            hosts.push(mock.allocate_next_address("default", "10.0.0.0/30", name, &ea).await.unwrap().ipv4addr);
        }
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(mock.allocate_next_address("default", "10.0.0.0/30", "c", &ea).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockInfobloxClient::new("https://gm/wapi/v2.11");
        mock.add_network_view("default");
        mock.set_failure(Some("grid unreachable"));
        assert!(matches!(
            mock.get_network_view("default").await,
            Err(InfobloxError::Api(_))
        ));
        mock.set_failure(None);
        assert!(mock.get_network_view("default").await.unwrap().is_some());
    }
}
