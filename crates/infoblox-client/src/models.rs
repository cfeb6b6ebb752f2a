//! Infoblox WAPI models
//!
//! Only the fields the controller reads or writes are modelled; WAPI returns
//! whatever `_return_fields` asks for and ignores the rest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extensible attribute value as WAPI expects it (`{"value": ...}`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtAttrValue {
    pub value: String,
}

/// Extensible attributes attached to an object, keyed by attribute name
pub type ExtAttrs = BTreeMap<String, ExtAttrValue>;

/// Build a single-attribute EA map
pub fn ext_attrs(name: &str, value: &str) -> ExtAttrs {
    let mut attrs = ExtAttrs::new();
    attrs.insert(
        name.to_string(),
        ExtAttrValue {
            value: value.to_string(),
        },
    );
    attrs
}

/// `networkview` object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkView {
    #[serde(rename = "_ref")]
    pub reference: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// `network` object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "_ref")]
    pub reference: String,
    pub network: String, // e.g., "172.16.4.0/24"
    pub network_view: String,
}

/// `extensibleattributedef` object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EaDefinition {
    #[serde(rename = "_ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String, // "STRING", "INTEGER", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// `fixedaddress` object (an address reservation inside a network)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedAddress {
    #[serde(rename = "_ref")]
    pub reference: String,
    pub ipv4addr: String,
    #[serde(default)]
    pub name: String,
    pub network_view: String,
}

/// `record:a` object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordA {
    #[serde(rename = "_ref")]
    pub reference: String,
    pub name: String,
    pub ipv4addr: String,
    #[serde(default)]
    pub view: String,
}

/// Error body WAPI returns on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct WapiErrorBody {
    #[serde(rename = "Error", default)]
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub text: String,
}

/// Connection parameters for a grid master
#[derive(Clone)]
pub struct HostConfig {
    pub host: String,
    pub version: String,
    pub port: String,
    pub username: String,
    pub password: String,
    /// Verify the grid's TLS certificate
    pub ssl_verify: bool,
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("host", &self.host)
            .field("version", &self.version)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_verify", &self.ssl_verify)
            .finish()
    }
}

impl HostConfig {
    /// Base WAPI URL, e.g. `https://gm.example.com:443/wapi/v2.11`
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        format!("https://{}:{}/wapi/v{}", host, self.port, self.version)
    }
}
