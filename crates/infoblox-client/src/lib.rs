//! Infoblox WAPI Client
//!
//! A Rust client library for the subset of the Infoblox WAPI the IPAM
//! controller relies on: network views, networks, fixed addresses,
//! `record:a` objects and extensible attribute definitions.
//!
//! # Example
//!
//! ```no_run
//! use infoblox_client::{HostConfig, InfobloxClient, InfobloxClientTrait, ext_attrs};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InfobloxClient::new(HostConfig {
//!     host: "gm.example.com".to_string(),
//!     version: "2.11".to_string(),
//!     port: "443".to_string(),
//!     username: "admin".to_string(),
//!     password: "infoblox".to_string(),
//!     ssl_verify: true,
//! })?;
//!
//! // Reserve the next free address in a network
//! let ea = ext_attrs("IPAM-CONTROLLER", "managed");
//! let addr = client.allocate_next_address("default", "172.16.4.0/24", "foo.com", &ea).await?;
//! client.create_record_a("foo.com", &addr.ipv4addr, &ea).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod infoblox_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::InfobloxClient;
pub use common::HttpClient;
pub use error::InfobloxError;
pub use models::*;
pub use infoblox_trait::InfobloxClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockInfobloxClient;
