//! IPAM Controller
//!
//! Allocates IPv4 addresses for the host and key bindings declared in
//! `IPAM` resources, from local SQLite-backed pools or an Infoblox grid, and
//! records the allocated addresses in each resource's status.

mod config;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod status;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Cli;
use crate::error::ControllerError;
use clap::Parser;
use controller::Controller;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ControllerError::InvalidConfig("failed to install rustls crypto provider".to_string()))?;

    let config = Cli::parse().into_config()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .init();

    info!("Starting IPAM Controller");
    info!("Configuration:");
    info!("  Provider: {}", config.manager.provider);
    info!("  Namespace: {}", config.namespace);
    info!("  Metrics: {}", config.metrics_bind_address);

    Controller::new(config).run().await
}
