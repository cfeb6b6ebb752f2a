//! Reconciliation diff engine.
//!
//! Pure functions from IPAM resource snapshots to allocation operations.
//! Bindings are compared by their `(host, key, pool)` tuple.

use crds::{BindingKey, HostSpec, IPSpec, IPAM};
use ipam_core::{Operation, ResourceRef};
use kube::ResourceExt;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Correlation carried by every operation issued for `rsc`
pub fn resource_ref(rsc: &IPAM) -> ResourceRef {
    ResourceRef::new(rsc.name_any(), rsc.namespace().unwrap_or_default())
}

/// Operations for a resource seen for the first time.
///
/// Recorded status entries are replayed with their address first, so a
/// restarted controller re-asserts what it handed out before it looks at
/// the desired set. Recorded entries with no desired counterpart are then
/// deleted, and every desired entry gets a plain create.
pub fn on_create(rsc: &IPAM) -> Vec<Operation> {
    let owner = resource_ref(rsc);
    let desired = unique(&rsc.spec.host_specs);
    let desired_keys: HashSet<BindingKey> = desired.iter().map(|s| s.binding_key()).collect();
    let mut ops = Vec::new();

    for status in rsc.ip_status() {
        if let Some(op) = replay(&owner, status) {
            ops.push(op);
        }
    }
    for status in rsc.ip_status() {
        if desired_keys.contains(&status.binding_key()) {
            continue;
        }
        debug!("Status entry {:?} of {} is no longer desired", status.binding_key(), owner);
        if let Some(op) = delete(&owner, status.host.as_deref(), status.key.as_deref(), status.pool()) {
            ops.push(op);
        }
    }
    for spec in desired {
        if let Some(op) = create(&owner, spec) {
            ops.push(op);
        }
    }

    debug!("{} operations for new resource {}", ops.len(), owner);
    ops
}

/// Operations for a change of the desired set.
///
/// Deletes for removed bindings come before creates for added ones.
pub fn on_update(old: &IPAM, new: &IPAM) -> Vec<Operation> {
    let owner = resource_ref(new);
    let old_specs = unique(&old.spec.host_specs);
    let new_specs = unique(&new.spec.host_specs);
    let old_keys: HashSet<BindingKey> = old_specs.iter().map(|s| s.binding_key()).collect();
    let new_keys: HashSet<BindingKey> = new_specs.iter().map(|s| s.binding_key()).collect();

    let removed = old_specs
        .iter()
        .filter(|s| !new_keys.contains(&s.binding_key()))
        .filter_map(|s| delete(&owner, s.host.as_deref(), s.key.as_deref(), s.pool()));
    let added = new_specs
        .iter()
        .filter(|s| !old_keys.contains(&s.binding_key()))
        .filter_map(|s| create(&owner, s));

    removed.chain(added).collect()
}

/// Operations for a removed resource.
///
/// Addresses still recorded in another resource's status are left alone.
pub fn on_delete(rsc: &IPAM, others: &[IPAM]) -> Vec<Operation> {
    let owner = resource_ref(rsc);
    let shared: HashSet<&str> = others
        .iter()
        .filter(|other| resource_ref(other) != owner)
        .flat_map(|other| other.ip_status())
        .map(|s| s.ip.as_str())
        .filter(|ip| !ip.is_empty())
        .collect();

    rsc.ip_status()
        .iter()
        .filter(|status| {
            let keep = shared.contains(status.ip.as_str());
            if keep {
                debug!("{} is still recorded by another resource, not releasing", status.ip);
            }
            !keep
        })
        .filter_map(|status| delete(&owner, status.host.as_deref(), status.key.as_deref(), status.pool()))
        .collect()
}

fn unique(specs: &[HostSpec]) -> Vec<&HostSpec> {
    let mut seen = HashSet::new();
    specs.iter().filter(|s| seen.insert(s.binding_key())).collect()
}

fn identified(host: Option<&str>, key: Option<&str>) -> bool {
    host.is_some_and(|h| !h.is_empty()) || key.is_some_and(|k| !k.is_empty())
}

fn create(owner: &ResourceRef, spec: &HostSpec) -> Option<Operation> {
    let Some(pool) = spec.pool() else {
        warn!("Skipping binding without ipamLabel or cidr in {}: {:?}", owner, spec);
        return None;
    };
    if !identified(spec.host.as_deref(), spec.key.as_deref()) {
        warn!("Skipping binding without host or key in {}: {:?}", owner, spec);
        return None;
    }
    Some(Operation::create(
        owner.clone(),
        spec.host.as_deref(),
        spec.key.as_deref(),
        pool,
    ))
}

fn replay(owner: &ResourceRef, status: &IPSpec) -> Option<Operation> {
    let pool = status.pool()?;
    if status.ip.is_empty() || !identified(status.host.as_deref(), status.key.as_deref()) {
        return None;
    }
    Some(Operation::replay(
        owner.clone(),
        status.host.as_deref(),
        status.key.as_deref(),
        pool,
        &status.ip,
    ))
}

fn delete(
    owner: &ResourceRef,
    host: Option<&str>,
    key: Option<&str>,
    pool: Option<&str>,
) -> Option<Operation> {
    let pool = pool?;
    if !identified(host, key) {
        return None;
    }
    Some(Operation::delete(owner.clone(), host, key, pool))
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
