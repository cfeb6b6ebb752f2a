//! Single-writer coordinator.
//!
//! Operations arrive on a bounded channel and are applied one at a time, in
//! arrival order, against the allocation manager. Results leave on a second
//! bounded channel; a full result channel holds the loop back rather than
//! queueing without limit. Consumers must correlate results by their
//! operation's fields, not by position.
//!
//! Allocation-path errors stop here: they are logged and turned into a
//! failed [`IpamResult`].

use crate::error::ManagerError;
use crate::manager::AllocationManager;
use crate::operation::{IpamResult, Operation, OperationKind};
use crate::range::parse_ipv4;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default depth of the request and result channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Applies operations against an [`AllocationManager`]
#[derive(Clone)]
pub struct Coordinator {
    manager: Arc<dyn AllocationManager>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("manager", &self.manager.name())
            .finish()
    }
}

/// Start a coordinator task.
///
/// Returns the request sender, the result receiver and the task handle. The
/// task finishes once every request sender is dropped and the queue is drained.
pub fn spawn(
    manager: Arc<dyn AllocationManager>,
    capacity: usize,
) -> (mpsc::Sender<Operation>, mpsc::Receiver<IpamResult>, JoinHandle<()>) {
    let capacity = capacity.max(1);
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (result_tx, result_rx) = mpsc::channel(capacity);
    let coordinator = Coordinator::new(manager);
    let handle = tokio::spawn(coordinator.run(request_rx, result_tx));
    (request_tx, result_rx, handle)
}

impl Coordinator {
    pub fn new(manager: Arc<dyn AllocationManager>) -> Self {
        Self { manager }
    }

    /// Drain `requests` until every sender is gone, publishing one result per operation
    pub async fn run(self, mut requests: mpsc::Receiver<Operation>, results: mpsc::Sender<IpamResult>) {
        info!("Coordinator started with {} backend", self.manager.name());
        let mut publishing = true;

        while let Some(op) = requests.recv().await {
            let result = self.process(op).await;
            if publishing && results.send(result).await.is_err() {
                warn!("Result receiver closed; further results are dropped");
                publishing = false;
            }
        }

        info!("Coordinator stopped: request channel closed");
    }

    /// Apply a single operation
    pub async fn process(&self, op: Operation) -> IpamResult {
        debug!("Processing {}", op);
        match op.kind {
            OperationKind::Create => match self.create(&op).await {
                Ok(address) => {
                    info!("Bound {} to {}", op.reference().unwrap_or("-"), address);
                    IpamResult::success(op, Some(address))
                }
                Err(e) => {
                    error!("Create failed for {}: {}", op, e);
                    IpamResult::failure(op)
                }
            },
            OperationKind::Delete => {
                self.delete(&op).await;
                IpamResult::success(op, None)
            }
        }
    }

    async fn create(&self, op: &Operation) -> Result<Ipv4Addr, ManagerError> {
        if let Some(explicit) = op.explicit_address.as_deref() {
            let address = parse_ipv4(explicit).map_err(|_| ManagerError::InvalidAddress(explicit.to_string()))?;
            self.manager.allocate_ip_address(op, address).await?;
            self.bind_dns(op, address).await;
            return Ok(address);
        }

        if let Some(address) = self.manager.get_ip_address(op).await? {
            debug!("{} already bound to {}", op.reference().unwrap_or("-"), address);
            return Ok(address);
        }

        let address = self.manager.allocate_next_ip_address(op).await?;
        self.bind_dns(op, address).await;
        Ok(address)
    }

    async fn bind_dns(&self, op: &Operation, address: Ipv4Addr) {
        if op.host_name.is_none() {
            return;
        }
        if let Err(e) = self.manager.create_dns_record(op, address).await {
            warn!("Failed to create A record for {} -> {}: {}", op, address, e);
        }
    }

    /// Deleting a binding that does not exist is not an error
    async fn delete(&self, op: &Operation) {
        let address = match self.manager.get_ip_address(op).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                debug!("Nothing bound for {}", op);
                return;
            }
            Err(e) => {
                warn!("Lookup failed for {}: {}", op, e);
                return;
            }
        };

        if let Err(e) = self.manager.release_ip_address(op, address).await {
            error!("Failed to release {} for {}: {}", address, op, e);
        }
        if op.host_name.is_some() {
            if let Err(e) = self.manager.delete_dns_record(op, address).await {
                warn!("Failed to delete A record for {} -> {}: {}", op, address, e);
            }
        }
        info!("Released {} from {}", address, op.reference().unwrap_or("-"));
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_test;
