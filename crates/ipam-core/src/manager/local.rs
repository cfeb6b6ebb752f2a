//! Local pool manager backed by [`PoolStore`]

use super::{require_pool, require_reference, AllocationManager};
use crate::error::ManagerError;
use crate::operation::Operation;
use crate::range::parse_pool_config;
use crate::store::{ExactAllocation, PoolStore, SyncReport};
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, warn};

/// Allocates from SQLite address pools and keeps DNS bindings alongside them
#[derive(Debug)]
pub struct LocalPoolManager {
    store: PoolStore,
}

impl LocalPoolManager {
    /// Open the store at `db_path` and reconcile it against `ranges`
    pub fn open(ranges: &str, db_path: &Path) -> Result<Self, ManagerError> {
        let store = PoolStore::open(db_path)?;
        let (manager, _) = Self::with_store(store, ranges)?;
        Ok(manager)
    }

    /// Reconcile an already opened store against `ranges`
    pub fn with_store(store: PoolStore, ranges: &str) -> Result<(Self, SyncReport), ManagerError> {
        let pools = parse_pool_config(ranges)?;
        if pools.is_empty() {
            return Err(ManagerError::Config("no address pools configured".to_string()));
        }
        let report = store.sync_pools(&pools)?;
        store.log_table()?;
        Ok((Self { store }, report))
    }

    /// Underlying store
    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    fn known_pool<'a>(&self, op: &'a Operation) -> Result<&'a str, ManagerError> {
        let pool = require_pool(op)?;
        if !self.store.has_pool(pool)? {
            return Err(ManagerError::UnknownPool(pool.to_string()));
        }
        Ok(pool)
    }
}

#[async_trait::async_trait]
impl AllocationManager for LocalPoolManager {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_ip_address(&self, op: &Operation) -> Result<Option<Ipv4Addr>, ManagerError> {
        let reference = require_reference(op)?;
        let pool = self.known_pool(op)?;
        Ok(self.store.lookup(pool, reference)?)
    }

    async fn allocate_next_ip_address(&self, op: &Operation) -> Result<Ipv4Addr, ManagerError> {
        let reference = require_reference(op)?;
        let pool = self.known_pool(op)?;
        self.store
            .allocate_next(pool, reference)?
            .ok_or_else(|| ManagerError::PoolExhausted(pool.to_string()))
    }

    async fn allocate_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let reference = require_reference(op)?;
        let pool = self.known_pool(op)?;
        match self.store.allocate_exact(pool, address, reference)? {
            ExactAllocation::Allocated => Ok(()),
            ExactAllocation::AlreadyBound => {
                debug!("{} already bound to {} in pool {}", reference, address, pool);
                Ok(())
            }
            ExactAllocation::Conflict => Err(ManagerError::Conflict {
                pool: pool.to_string(),
                address: address.to_string(),
            }),
            ExactAllocation::ReferenceBound(owned) => {
                warn!("{} already owns {} in pool {}, refusing {}", reference, owned, pool, address);
                Err(ManagerError::Conflict {
                    pool: pool.to_string(),
                    address: address.to_string(),
                })
            }
            ExactAllocation::NotInPool => Err(ManagerError::InvalidAddress(format!(
                "{} is not part of pool {}",
                address, pool
            ))),
        }
    }

    async fn release_ip_address(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let pool = self.known_pool(op)?;
        if !self.store.release(pool, address)? {
            debug!("{} in pool {} was not allocated", address, pool);
        }
        Ok(())
    }

    async fn create_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let Some(host) = op.host_name.as_deref() else {
            return Ok(());
        };
        let pool = require_pool(op)?;
        self.store.create_dns_record(pool, host, address)?;
        debug!("Created A record {} -> {}", host, address);
        Ok(())
    }

    async fn delete_dns_record(&self, op: &Operation, address: Ipv4Addr) -> Result<(), ManagerError> {
        let Some(host) = op.host_name.as_deref() else {
            return Ok(());
        };
        let pool = require_pool(op)?;
        if self.store.delete_dns_record(pool, host, address)? {
            debug!("Deleted A record {} -> {}", host, address);
        }
        Ok(())
    }
}
