//! InfobloxClient trait for mocking
//!
//! This trait abstracts the InfobloxClient to enable mocking in unit tests.
//! The concrete InfobloxClient implements this trait, and tests can use mock implementations.

use crate::error::InfobloxError;
use crate::models::*;

/// Trait for Infoblox WAPI operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait InfobloxClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    // Network operations
    async fn get_network_view(&self, name: &str) -> Result<Option<NetworkView>, InfobloxError>;
    async fn get_network(&self, network_view: &str, cidr: &str) -> Result<Option<Network>, InfobloxError>;

    // Extensible attribute operations
    async fn get_ea_definition(&self, name: &str) -> Result<Option<EaDefinition>, InfobloxError>;
    async fn create_ea_definition(&self, definition: &EaDefinition) -> Result<String, InfobloxError>;

    // Address operations
    async fn allocate_next_address(&self, network_view: &str, cidr: &str, name: &str, ea: &ExtAttrs) -> Result<FixedAddress, InfobloxError>;
    async fn create_fixed_address(&self, network_view: &str, ipv4addr: &str, name: &str, ea: &ExtAttrs) -> Result<FixedAddress, InfobloxError>;
    async fn query_fixed_addresses(&self, filters: &[(&str, &str)]) -> Result<Vec<FixedAddress>, InfobloxError>;

    // DNS operations
    async fn create_record_a(&self, name: &str, ipv4addr: &str, ea: &ExtAttrs) -> Result<RecordA, InfobloxError>;
    async fn query_records_a(&self, filters: &[(&str, &str)]) -> Result<Vec<RecordA>, InfobloxError>;

    /// Delete any object by its `_ref`
    async fn delete_object(&self, reference: &str) -> Result<(), InfobloxError>;
}
