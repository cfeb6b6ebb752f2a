//! Controller-specific error types.
//!
//! Only startup and watch failures surface here; allocation failures are
//! turned into failed results inside the coordinator.

use ipam_core::ManagerError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the IPAM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Allocation manager could not be built
    #[error("Allocation manager error: {0}")]
    Manager(#[from] ManagerError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading the credentials directory failed
    #[error("Failed to read {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Metrics registry or server failure
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Background task failed to join
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<prometheus::Error> for ControllerError {
    fn from(err: prometheus::Error) -> Self {
        ControllerError::Metrics(err.to_string())
    }
}
