//! Main controller implementation.
//!
//! Wires the allocation manager, coordinator, status writer, watcher and
//! metrics server together and owns the shutdown sequence: stop watching,
//! let queued operations drain, then let the status writer flush.

use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::status::StatusWriter;
use crate::watcher::Watcher;
use crds::IPAM;
use ipam_core::coordinator;
use ipam_core::manager::new_manager;
use kube::{Api, Client};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Main controller for IPAM resources.
pub struct Controller {
    config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the controller until the watch ends or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        let config = self.config;
        info!("Initializing IPAM Controller");

        let metrics = Metrics::new()?;
        let manager = new_manager(config.manager.clone()).await?;
        info!("Allocation manager ready: {}", manager.name());

        let kube_client = Client::try_default().await?;
        let api: Api<IPAM> = Api::namespaced(kube_client.clone(), &config.namespace);

        let (requests, results, coordinator) = coordinator::spawn(manager, config.channel_capacity);
        let status_writer = tokio::spawn(StatusWriter::new(kube_client, metrics.clone()).run(results));

        let (stop_server, server_stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(metrics::serve(
            config.metrics_bind_address,
            metrics.clone(),
            async move {
                let _ = server_stopped.await;
            },
        ));

        let watcher = Watcher::new(api, requests, metrics.clone());
        info!("IPAM Controller running in namespace {}", config.namespace);

        // Dropping the watcher future drops the last request sender.
        let outcome = tokio::select! {
            result = watcher.run() => result,
            _ = shutdown_signal() => Ok(()),
        };
        metrics.set_ready(false);

        info!("Draining queued operations");
        coordinator.await?;
        status_writer.await?;

        let _ = stop_server.send(());
        match server.await? {
            Ok(()) => {}
            Err(e) => error!("Metrics server stopped with error: {}", e),
        }

        info!("IPAM Controller stopped");
        outcome
    }
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
