//! Test utilities for unit testing the controller
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Helper to create a host-keyed binding request
#[cfg(test)]
pub fn host_spec(host: &str, label: &str) -> HostSpec {
    HostSpec {
        host: Some(host.to_string()),
        ipam_label: Some(label.to_string()),
        ..Default::default()
    }
}

/// Helper to create a key-only (headless) binding request
#[cfg(test)]
pub fn key_spec(key: &str, label: &str) -> HostSpec {
    HostSpec {
        key: Some(key.to_string()),
        ipam_label: Some(label.to_string()),
        ..Default::default()
    }
}

/// Helper to turn a request into a recorded status entry
#[cfg(test)]
pub fn recorded(spec: &HostSpec, ip: &str) -> IPSpec {
    IPSpec {
        host: spec.host.clone(),
        key: spec.key.clone(),
        cidr: spec.cidr.clone(),
        ipam_label: spec.ipam_label.clone(),
        ip: ip.to_string(),
    }
}

/// Helper to create test IPAM resource
#[cfg(test)]
pub fn create_test_ipam(name: &str, namespace: &str, specs: Vec<HostSpec>, status: Vec<IPSpec>) -> IPAM {
    IPAM {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: IPAMSpec { host_specs: specs },
        status: if status.is_empty() {
            None
        } else {
            Some(IPAMStatus {
                ip_status: status,
                last_updated: None,
            })
        },
    }
}
