//! IPAM allocation engine
//!
//! Turns allocation [`Operation`]s into address bindings. Operations are
//! applied one at a time by the [`coordinator`] against an
//! [`AllocationManager`], which is either the SQLite-backed local pool
//! manager or the Infoblox adapter.
//!
//! # Example
//!
//! ```no_run
//! use ipam_core::{coordinator, manager, Operation, ResourceRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = manager::new_manager(manager::Params::local(
//!     r#"{"dev": "10.0.0.1-10.0.0.20"}"#,
//!     "/var/lib/ipam/ipam.sqlite3",
//! ))
//! .await?;
//!
//! let (requests, mut results, handle) = coordinator::spawn(manager, 64);
//! let owner = ResourceRef::new("ipam", "kube-system");
//! requests.send(Operation::create(owner, Some("foo.com"), None, "dev")).await?;
//! let result = results.recv().await;
//! drop(requests);
//! handle.await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod manager;
pub mod operation;
pub mod range;
pub mod store;

pub use error::{ManagerError, RangeError, StoreError};
pub use manager::{AllocationManager, Params};
pub use operation::{IpamResult, Operation, OperationKind, ResourceRef};
