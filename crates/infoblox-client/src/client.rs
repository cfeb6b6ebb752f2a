//! Infoblox WAPI client
//!
//! Implements the WAPI calls used for address allocation and DNS records.
//! Objects are addressed by path (`network`, `fixedaddress`, `record:a`) and
//! deleted by their opaque `_ref`.

use crate::common::HttpClient;
use crate::error::InfobloxError;
use crate::infoblox_trait::InfobloxClientTrait;
use crate::models::*;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const FIXED_ADDRESS_FIELDS: &str = "ipv4addr,name,network_view";
const RECORD_A_FIELDS: &str = "name,ipv4addr,view";

/// Reservations are not bound to a real NIC
const PLACEHOLDER_MAC: &str = "00:00:00:00:00:00";

/// Infoblox WAPI client
#[derive(Debug)]
pub struct InfobloxClient {
    http: HttpClient,
}

impl InfobloxClient {
    /// Create a new Infoblox client
    ///
    /// # Arguments
    /// * `config` - Grid host, WAPI version/port and credentials
    pub fn new(config: HostConfig) -> Result<Self, InfobloxError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(10)
            .danger_accept_invalid_certs(!config.ssl_verify)
            .build()
            .map_err(InfobloxError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, config.base_url(), config.username, config.password),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn query<T: for<'de> serde::Deserialize<'de>>(
        &self,
        object: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<T>, InfobloxError> {
        let path = self.http.with_query(object, filters);
        self.http.get(&path).await
    }

    async fn post_fixed_address(
        &self,
        network_view: &str,
        ipv4addr: &str,
        name: &str,
        ea: &ExtAttrs,
    ) -> Result<FixedAddress, InfobloxError> {
        if name.is_empty() {
            return Err(InfobloxError::InvalidRequest(
                "fixed address requires a name".to_string(),
            ));
        }
        let body = serde_json::json!({
            "network_view": network_view,
            "ipv4addr": ipv4addr,
            "name": name,
            "mac": PLACEHOLDER_MAC,
            "extattrs": ea,
        });
        let path = self
            .http
            .with_query("fixedaddress", &[("_return_fields", FIXED_ADDRESS_FIELDS)]);
        self.http.post(&path, &body).await
    }
}

#[async_trait::async_trait]
impl InfobloxClientTrait for InfobloxClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    async fn get_network_view(&self, name: &str) -> Result<Option<NetworkView>, InfobloxError> {
        debug!("Fetching network view {}", name);
        let views: Vec<NetworkView> = self
            .query("networkview", &[("name", name), ("_return_fields", "name,is_default")])
            .await?;
        Ok(views.into_iter().next())
    }

    async fn get_network(&self, network_view: &str, cidr: &str) -> Result<Option<Network>, InfobloxError> {
        debug!("Fetching network {} in view {}", cidr, network_view);
        let networks: Vec<Network> = self
            .query(
                "network",
                &[
                    ("network_view", network_view),
                    ("network", cidr),
                    ("_return_fields", "network,network_view"),
                ],
            )
            .await?;
        Ok(networks.into_iter().next())
    }

    async fn get_ea_definition(&self, name: &str) -> Result<Option<EaDefinition>, InfobloxError> {
        let defs: Vec<EaDefinition> = self
            .query(
                "extensibleattributedef",
                &[("name", name), ("_return_fields", "name,type,comment")],
            )
            .await?;
        Ok(defs.into_iter().next())
    }

    async fn create_ea_definition(&self, definition: &EaDefinition) -> Result<String, InfobloxError> {
        let body = serde_json::to_value(definition)?;
        self.http.post("extensibleattributedef", &body).await
    }

    async fn allocate_next_address(
        &self,
        network_view: &str,
        cidr: &str,
        name: &str,
        ea: &ExtAttrs,
    ) -> Result<FixedAddress, InfobloxError> {
        let func = format!("func:nextavailableip:{},{}", cidr, network_view);
        self.post_fixed_address(network_view, &func, name, ea).await
    }

    async fn create_fixed_address(
        &self,
        network_view: &str,
        ipv4addr: &str,
        name: &str,
        ea: &ExtAttrs,
    ) -> Result<FixedAddress, InfobloxError> {
        self.post_fixed_address(network_view, ipv4addr, name, ea).await
    }

    async fn query_fixed_addresses(&self, filters: &[(&str, &str)]) -> Result<Vec<FixedAddress>, InfobloxError> {
        let mut filters = filters.to_vec();
        filters.push(("_return_fields", FIXED_ADDRESS_FIELDS));
        self.query("fixedaddress", &filters).await
    }

    async fn create_record_a(&self, name: &str, ipv4addr: &str, ea: &ExtAttrs) -> Result<RecordA, InfobloxError> {
        let body = serde_json::json!({
            "name": name,
            "ipv4addr": ipv4addr,
            "extattrs": ea,
        });
        let path = self.http.with_query("record:a", &[("_return_fields", RECORD_A_FIELDS)]);
        self.http.post(&path, &body).await
    }

    async fn query_records_a(&self, filters: &[(&str, &str)]) -> Result<Vec<RecordA>, InfobloxError> {
        let mut filters = filters.to_vec();
        filters.push(("_return_fields", RECORD_A_FIELDS));
        self.query("record:a", &filters).await
    }

    async fn delete_object(&self, reference: &str) -> Result<(), InfobloxError> {
        self.http.delete(reference).await
    }
}
