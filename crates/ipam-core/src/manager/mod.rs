//! Allocation managers
//!
//! One contract, two backends:
//! - [`LocalPoolManager`]: SQLite address pools plus a local DNS binding table
//! - [`InfobloxManager`]: delegates to an Infoblox grid, one network per label
//!
//! The manager is built once at startup from [`Params`] and never swapped.

pub mod infoblox;
pub mod local;

pub use infoblox::InfobloxManager;
pub use local::LocalPoolManager;

use crate::error::ManagerError;
use crate::operation::Operation;
use infoblox_client::{HostConfig, InfobloxClient};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default location of the local pool database
pub const DEFAULT_DB_PATH: &str = "/app/ipamdb/cis_ipam.sqlite3";

/// Address allocation backend.
///
/// Every call is made from the coordinator's single loop, so implementations
/// never see two mutations at once.
#[async_trait::async_trait]
pub trait AllocationManager: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Address currently bound to the operation's reference, if any
    async fn get_ip_address(&self, op: &Operation) -> Result<Option<Ipv4Addr>, ManagerError>;

    /// Bind the next free address of the pool to the operation's reference
    async fn allocate_next_ip_address(&self, op: &Operation) -> Result<Ipv4Addr, ManagerError>;

    /// Bind exactly `address`; succeeds without change if it is already bound to the same reference
    async fn allocate_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError>;

    /// Return `address` to the pool
    async fn release_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError>;

    /// Publish a DNS binding for the operation's host name
    async fn create_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError>;

    /// Remove the DNS binding for the operation's host name
    async fn delete_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError>;
}

/// Backend-specific construction parameters
#[derive(Debug, Clone)]
pub enum ProviderParams {
    Local {
        /// JSON map of label → range spec
        ranges: String,
        db_path: PathBuf,
    },
    Infoblox {
        host: HostConfig,
        /// JSON map of label → `{"cidr": ...}`
        labels: String,
        network_view: String,
    },
}

impl std::fmt::Display for ProviderParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderParams::Local { db_path, .. } => write!(f, "local ({})", db_path.display()),
            ProviderParams::Infoblox { host, network_view, .. } => {
                write!(f, "infoblox ({}, view {})", host.base_url(), network_view)
            }
        }
    }
}

/// Allocation manager construction parameters
#[derive(Debug, Clone)]
pub struct Params {
    pub provider: ProviderParams,
}

impl Params {
    pub fn local(ranges: impl Into<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            provider: ProviderParams::Local {
                ranges: ranges.into(),
                db_path: db_path.into(),
            },
        }
    }

    pub fn infoblox(host: HostConfig, labels: impl Into<String>, network_view: impl Into<String>) -> Self {
        Self {
            provider: ProviderParams::Infoblox {
                host,
                labels: labels.into(),
                network_view: network_view.into(),
            },
        }
    }
}

/// Build the configured allocation manager.
///
/// Errors here are startup errors: bad pool configuration, an unopenable
/// store, or an external IPAM that cannot confirm every configured label.
pub async fn new_manager(params: Params) -> Result<Arc<dyn AllocationManager>, ManagerError> {
    match params.provider {
        ProviderParams::Local { ranges, db_path } => {
            info!("Using local address pools at {}", db_path.display());
            let manager = LocalPoolManager::open(&ranges, &db_path)?;
            Ok(Arc::new(manager))
        }
        ProviderParams::Infoblox {
            host,
            labels,
            network_view,
        } => {
            info!("Using Infoblox grid at {}", host.host);
            let client = InfobloxClient::new(host)?;
            let manager = InfobloxManager::new(Arc::new(client), &labels, &network_view).await?;
            Ok(Arc::new(manager))
        }
    }
}

/// Reference of an operation, rejecting operations that carry neither host nor key
pub(crate) fn require_reference(op: &Operation) -> Result<&str, ManagerError> {
    op.reference()
        .ok_or_else(|| ManagerError::InvalidRequest(format!("{} has neither host nor key", op)))
}

/// Pool of an operation, rejecting an empty one
pub(crate) fn require_pool(op: &Operation) -> Result<&str, ManagerError> {
    if op.pool.trim().is_empty() {
        return Err(ManagerError::InvalidRequest(format!("{} has no pool", op)));
    }
    Ok(&op.pool)
}
