//! IPAM CRD
//!
//! Declares host/key → address bindings requested from a pool, and records
//! the addresses actually allocated for them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "dcops.microscaler.io",
    version = "v1",
    kind = "IPAM",
    namespaced,
    status = "IPAMStatus",
    shortname = "ipam"
)]
#[serde(rename_all = "camelCase")]
pub struct IPAMSpec {
    /// Requested bindings
    #[serde(default)]
    pub host_specs: Vec<HostSpec>,
}

/// A single requested binding.
///
/// Exactly one of `host`/`key` names the binding; `key` is used for headless
/// bindings that never get a DNS record. The pool is `ipamLabel` when set,
/// otherwise `cidr`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostSpec {
    /// DNS host name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Opaque binding key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Pool identified by CIDR (legacy form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Pool identified by label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_label: Option<String>,
}

impl HostSpec {
    /// Pool this binding is requested from.
    pub fn pool(&self) -> Option<&str> {
        non_empty(self.ipam_label.as_deref()).or_else(|| non_empty(self.cidr.as_deref()))
    }

    /// Identity used to compare bindings across desired and recorded sets.
    pub fn binding_key(&self) -> BindingKey {
        BindingKey::new(self.host.as_deref(), self.key.as_deref(), self.pool())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPAMStatus {
    /// Allocated bindings, written only by the controller
    #[serde(default)]
    pub ip_status: Vec<IPSpec>,

    /// Last time the controller wrote this status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// A recorded binding together with its allocated address.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct IPSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam_label: Option<String>,

    /// Allocated IPv4 address
    #[serde(default)]
    pub ip: String,
}

impl IPSpec {
    pub fn pool(&self) -> Option<&str> {
        non_empty(self.ipam_label.as_deref()).or_else(|| non_empty(self.cidr.as_deref()))
    }

    pub fn binding_key(&self) -> BindingKey {
        BindingKey::new(self.host.as_deref(), self.key.as_deref(), self.pool())
    }

    /// The request this status entry was recorded for.
    pub fn host_spec(&self) -> HostSpec {
        HostSpec {
            host: self.host.clone(),
            key: self.key.clone(),
            cidr: self.cidr.clone(),
            ipam_label: self.ipam_label.clone(),
        }
    }
}

/// `(host, key, pool)` identity of a binding.
///
/// Empty strings are normalized to `None` so that `host: ""` and an absent
/// host compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BindingKey {
    pub host: Option<String>,
    pub key: Option<String>,
    pub pool: Option<String>,
}

impl BindingKey {
    pub fn new(host: Option<&str>, key: Option<&str>, pool: Option<&str>) -> Self {
        Self {
            host: non_empty(host).map(str::to_string),
            key: non_empty(key).map(str::to_string),
            pool: non_empty(pool).map(str::to_string),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl IPAM {
    /// Recorded bindings, empty when no status has been written yet.
    pub fn ip_status(&self) -> &[IPSpec] {
        self.status.as_ref().map_or(&[], |s| s.ip_status.as_slice())
    }
}
