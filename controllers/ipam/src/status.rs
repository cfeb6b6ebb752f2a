//! Status writer.
//!
//! Consumes coordinator results and folds them into the `status.ipStatus`
//! list of the resource they were issued for. Results carry no ordering
//! guarantee, so entries are matched on their `(host, key, pool)` fields.

use crate::metrics::Metrics;
use chrono::Utc;
use crds::{BindingKey, IPSpec, IPAM};
use ipam_core::{IpamResult, OperationKind};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Fold one result into a status list.
///
/// A successful create upserts the entry with its address. A failed create
/// or any delete removes the matching entry. Returns whether the list changed.
pub fn apply_result(entries: &mut Vec<IPSpec>, result: &IpamResult) -> bool {
    let op = &result.operation;
    let key = BindingKey::new(op.host_name.as_deref(), op.key.as_deref(), Some(op.pool.as_str()));
    let position = entries.iter().position(|e| e.binding_key() == key);

    match (op.kind, result.succeeded, result.address) {
        (OperationKind::Create, true, Some(address)) => {
            let ip = address.to_string();
            match position {
                Some(i) if entries[i].ip == ip => false,
                Some(i) => {
                    entries[i].ip = ip;
                    true
                }
                None => {
                    entries.push(status_entry(result, ip));
                    true
                }
            }
        }
        (OperationKind::Create, true, None) => {
            warn!("Successful create without an address: {}", op);
            false
        }
        _ => match position {
            Some(i) => {
                entries.remove(i);
                true
            }
            None => false,
        },
    }
}

fn status_entry(result: &IpamResult, ip: String) -> IPSpec {
    let op = &result.operation;
    let (cidr, ipam_label) = if op.pool.contains('/') {
        (Some(op.pool.clone()), None)
    } else {
        (None, Some(op.pool.clone()))
    };
    IPSpec {
        host: op.host_name.clone(),
        key: op.key.clone(),
        cidr,
        ipam_label,
        ip,
    }
}

/// Writes results back to IPAM status subresources.
pub struct StatusWriter {
    client: Client,
    metrics: Metrics,
}

impl StatusWriter {
    pub fn new(client: Client, metrics: Metrics) -> Self {
        Self { client, metrics }
    }

    /// Apply results until the coordinator closes the channel
    pub async fn run(self, mut results: mpsc::Receiver<IpamResult>) {
        info!("Status writer started");
        while let Some(result) = results.recv().await {
            self.metrics.record_result(&result);
            let outcome = match self.write(&result).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        "Failed to update status of IPAM {} for {}: {}",
                        result.operation.correlation, result.operation, e
                    );
                    "error"
                }
            };
            self.metrics.record_status_update(outcome);
        }
        info!("Status writer stopped");
    }

    async fn write(&self, result: &IpamResult) -> Result<&'static str, kube::Error> {
        let owner = &result.operation.correlation;
        let api: Api<IPAM> = Api::namespaced(self.client.clone(), &owner.namespace);

        let Some(rsc) = api.get_opt(&owner.name).await? else {
            debug!("IPAM {} is gone, dropping result for {}", owner, result.operation);
            return Ok("missing");
        };

        let mut entries = rsc.ip_status().to_vec();
        if !apply_result(&mut entries, result) {
            debug!("Status of IPAM {} already reflects {}", owner, result.operation);
            return Ok("unchanged");
        }

        let patch = json!({
            "status": {
                "ipStatus": entries,
                "lastUpdated": Utc::now(),
            }
        });
        api.patch_status(&owner.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        match result.address {
            Some(address) => info!("Updated IPAM {} status: {} -> {}", owner, result.operation, address),
            None => info!("Updated IPAM {} status: {}", owner, result.operation),
        }
        Ok("patched")
    }
}
