//! Infoblox-backed allocation manager
//!
//! Each label maps to one network in one network view. A binding is a
//! fixed address named after the operation's reference; host-keyed
//! bindings additionally get a `record:a`. Every object the manager creates
//! is tagged with the `IPAM-CONTROLLER` extensible attribute.

use super::{require_pool, require_reference, AllocationManager};
use crate::error::ManagerError;
use crate::operation::Operation;
use crate::range::{parse_cidr, parse_ipv4, trim_quotes};
use infoblox_client::{ext_attrs, EaDefinition, ExtAttrs, InfobloxClientTrait};
use ipnet::Ipv4Net;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extensible attribute marking objects owned by this controller
pub const EA_NAME: &str = "IPAM-CONTROLLER";
pub const EA_VALUE: &str = "managed";

/// One entry of the label map, e.g. `{"cidr": "172.16.4.0/24"}`.
///
/// Unknown fields such as the retired `dnsView` are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelConfig {
    /// Overrides the manager-wide network view for this label
    #[serde(default)]
    pub net_view: Option<String>,
    pub cidr: String,
}

/// Parse the label → network JSON map
pub fn parse_labels(raw: &str) -> Result<BTreeMap<String, LabelConfig>, ManagerError> {
    let labels: BTreeMap<String, LabelConfig> = serde_json::from_str(trim_quotes(raw.trim()))
        .map_err(|e| ManagerError::Config(format!("invalid Infoblox label map: {}", e)))?;
    if labels.is_empty() {
        return Err(ManagerError::Config("no Infoblox labels configured".to_string()));
    }
    Ok(labels)
}

#[derive(Debug, Clone)]
struct LabelNetwork {
    network_view: String,
    cidr: String,
    network: Ipv4Net,
}

/// Allocation manager that delegates to an Infoblox grid
pub struct InfobloxManager {
    client: Arc<dyn InfobloxClientTrait>,
    labels: BTreeMap<String, LabelNetwork>,
    ea: ExtAttrs,
}

impl std::fmt::Debug for InfobloxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfobloxManager")
            .field("grid", &self.client.base_url())
            .field("labels", &self.labels)
            .finish()
    }
}

impl InfobloxManager {
    /// Build the manager and validate every label against the grid.
    ///
    /// Fails if the EA definition cannot be ensured or if any label's
    /// network view or network is missing.
    pub async fn new(
        client: Arc<dyn InfobloxClientTrait>,
        labels: &str,
        network_view: &str,
    ) -> Result<Self, ManagerError> {
        let mut resolved = BTreeMap::new();
        for (label, config) in parse_labels(labels)? {
            let network = parse_cidr(&config.cidr)
                .map_err(|e| ManagerError::Config(format!("label {}: {}", label, e)))?;
            let view = config
                .net_view
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| network_view.to_string());
            resolved.insert(
                label,
                LabelNetwork {
                    network_view: view,
                    cidr: config.cidr,
                    network,
                },
            );
        }

        let manager = Self {
            client,
            labels: resolved,
            ea: ext_attrs(EA_NAME, EA_VALUE),
        };
        manager.ensure_ea_definition().await?;
        manager.validate_labels().await?;
        Ok(manager)
    }

    async fn ensure_ea_definition(&self) -> Result<(), ManagerError> {
        if self.client.get_ea_definition(EA_NAME).await?.is_some() {
            debug!("Extensible attribute {} already defined", EA_NAME);
            return Ok(());
        }
        let definition = EaDefinition {
            reference: None,
            name: EA_NAME.to_string(),
            kind: "STRING".to_string(),
            comment: Some("Managed by the IPAM controller".to_string()),
        };
        let reference = self.client.create_ea_definition(&definition).await?;
        info!("Created extensible attribute definition {} ({})", EA_NAME, reference);
        Ok(())
    }

    async fn validate_labels(&self) -> Result<(), ManagerError> {
        for (label, net) in &self.labels {
            if self.client.get_network_view(&net.network_view).await?.is_none() {
                return Err(ManagerError::Config(format!(
                    "label {}: network view {} not found",
                    label, net.network_view
                )));
            }
            if self.client.get_network(&net.network_view, &net.cidr).await?.is_none() {
                return Err(ManagerError::Config(format!(
                    "label {}: network {} not found in view {}",
                    label, net.cidr, net.network_view
                )));
            }
            info!(label = %label, view = %net.network_view, cidr = %net.cidr, "Validated Infoblox label");
        }
        Ok(())
    }

    /// Fixed address named `reference` in the label's network
    async fn bound_address(&self, reference: &str, net: &LabelNetwork) -> Result<Option<Ipv4Addr>, ManagerError> {
        let found = self
            .client
            .query_fixed_addresses(&[
                ("name", reference),
                ("network_view", net.network_view.as_str()),
                ("network", net.cidr.as_str()),
            ])
            .await?;
        found.first().map(|a| address_of(&a.ipv4addr)).transpose()
    }

    fn label(&self, op: &Operation) -> Result<&LabelNetwork, ManagerError> {
        let pool = require_pool(op)?;
        self.labels
            .get(pool)
            .ok_or_else(|| ManagerError::UnknownPool(pool.to_string()))
    }
}

fn address_of(raw: &str) -> Result<Ipv4Addr, ManagerError> {
    parse_ipv4(raw).map_err(|_| ManagerError::InvalidAddress(raw.to_string()))
}

#[async_trait::async_trait]
impl AllocationManager for InfobloxManager {
    fn name(&self) -> &'static str {
        "infoblox"
    }

    async fn get_ip_address(&self, op: &Operation) -> Result<Option<Ipv4Addr>, ManagerError> {
        let reference = require_reference(op)?;
        let net = self.label(op)?;
        self.bound_address(reference, net).await
    }

    async fn allocate_next_ip_address(&self, op: &Operation) -> Result<Ipv4Addr, ManagerError> {
        let reference = require_reference(op)?;
        let net = self.label(op)?;
        let fixed = self
            .client
            .allocate_next_address(&net.network_view, &net.cidr, reference, &self.ea)
            .await?;
        debug!("Infoblox allocated {} for {}", fixed.ipv4addr, reference);
        address_of(&fixed.ipv4addr)
    }

    async fn allocate_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let reference = require_reference(op)?;
        let net = self.label(op)?;
        if !net.network.contains(&address) {
            return Err(ManagerError::InvalidAddress(format!(
                "{} is not part of network {}",
                address, net.cidr
            )));
        }

        let ipv4addr = address.to_string();
        match self.bound_address(reference, net).await? {
            Some(bound) if bound == address => {
                debug!("{} already bound to {}", reference, address);
                return Ok(());
            }
            Some(bound) => {
                warn!("{} is already bound to {}, refusing {}", reference, bound, address);
                return Err(ManagerError::Conflict {
                    pool: op.pool.clone(),
                    address: ipv4addr,
                });
            }
            None => {}
        }

        let existing = self
            .client
            .query_fixed_addresses(&[("ipv4addr", ipv4addr.as_str()), ("network_view", net.network_view.as_str())])
            .await?;
        if let Some(current) = existing.first() {
            if current.name == reference {
                debug!("{} already bound to {}", reference, address);
                return Ok(());
            }
            return Err(ManagerError::Conflict {
                pool: op.pool.clone(),
                address: ipv4addr,
            });
        }

        self.client
            .create_fixed_address(&net.network_view, &ipv4addr, reference, &self.ea)
            .await?;
        Ok(())
    }

    async fn release_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let net = self.label(op)?;
        let ipv4addr = address.to_string();
        let existing = self
            .client
            .query_fixed_addresses(&[("ipv4addr", ipv4addr.as_str()), ("network_view", net.network_view.as_str())])
            .await?;
        if existing.is_empty() {
            debug!("No fixed address for {} in view {}", address, net.network_view);
        }
        for fixed in existing {
            self.client.delete_object(&fixed.reference).await?;
        }
        Ok(())
    }

    async fn create_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let Some(host) = op.host_name.as_deref() else {
            return Ok(());
        };
        self.label(op)?;
        let ipv4addr = address.to_string();
        let existing = self
            .client
            .query_records_a(&[("name", host), ("ipv4addr", ipv4addr.as_str())])
            .await?;
        if !existing.is_empty() {
            return Ok(());
        }
        self.client.create_record_a(host, &ipv4addr, &self.ea).await?;
        debug!("Created A record {} -> {}", host, address);
        Ok(())
    }

    async fn delete_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let Some(host) = op.host_name.as_deref() else {
            return Ok(());
        };
        self.label(op)?;
        let ipv4addr = address.to_string();
        let records = self
            .client
            .query_records_a(&[("name", host), ("ipv4addr", ipv4addr.as_str())])
            .await?;
        if records.is_empty() {
            warn!("A record {} -> {} not found", host, address);
        }
        for record in records {
            self.client.delete_object(&record.reference).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "infoblox_test.rs"]
mod infoblox_test;
