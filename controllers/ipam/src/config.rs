//! Command-line configuration.
//!
//! Flags fall back to environment variables. Infoblox connection fields may
//! also come from a credentials directory holding one file per field; file
//! values win over flags.

use crate::error::ControllerError;
use clap::{Parser, ValueEnum};
use infoblox_client::HostConfig;
use ipam_core::coordinator::DEFAULT_CHANNEL_CAPACITY;
use ipam_core::manager::{Params, DEFAULT_DB_PATH};
use ipam_core::range::trim_quotes;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Orchestration {
    Kubernetes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IpProvider {
    /// Address pools kept in a local SQLite database
    Local,
    /// Infoblox grid
    Infoblox,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "ipam-controller")]
#[command(about = "Allocates addresses for IPAM resources from local pools or Infoblox")]
pub struct Cli {
    /// Logging level: DEBUG, INFO, WARNING, ERROR or CRITICAL
    #[arg(long, env = "LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    /// Orchestration the controller runs in
    #[arg(long, env = "ORCHESTRATION", value_enum, default_value = "kubernetes")]
    pub orchestration: Orchestration,

    /// IPAM system to allocate from
    #[arg(long, env = "IP_PROVIDER", value_enum, default_value = "local")]
    pub ip_provider: IpProvider,

    /// Namespace to watch for IPAM resources
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "kube-system")]
    pub namespace: String,

    /// Address the metrics and probe server binds to
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: SocketAddr,

    /// Depth of the request and result queues
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// JSON map of label to address range, e.g. '{"dev":"10.0.0.1-10.0.0.20"}'
    #[arg(long, env = "IP_RANGE")]
    pub ip_range: Option<String>,

    /// Local pool database
    #[arg(long, env = "DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    #[arg(long, env = "INFOBLOX_GRID_HOST")]
    pub infoblox_grid_host: Option<String>,

    #[arg(long, env = "INFOBLOX_WAPI_VERSION")]
    pub infoblox_wapi_version: Option<String>,

    #[arg(long, env = "INFOBLOX_WAPI_PORT", default_value = "443")]
    pub infoblox_wapi_port: String,

    #[arg(long, env = "INFOBLOX_USERNAME")]
    pub infoblox_username: Option<String>,

    #[arg(long, env = "INFOBLOX_PASSWORD", hide_env_values = true)]
    pub infoblox_password: Option<String>,

    /// JSON map of label to network, e.g. '{"Dev":{"cidr":"172.16.4.0/24"}}'
    #[arg(long, env = "INFOBLOX_LABELS")]
    pub infoblox_labels: Option<String>,

    /// Network view used for labels that do not name one
    #[arg(long, env = "INFOBLOX_NETVIEW", default_value = "default")]
    pub infoblox_netview: String,

    /// Skip TLS certificate verification towards the grid
    #[arg(long, env = "INFOBLOX_SSL_INSECURE")]
    pub infoblox_ssl_insecure: bool,

    /// Directory with one file per Infoblox credential field
    #[arg(long, env = "CREDENTIALS_DIRECTORY")]
    pub credentials_directory: Option<PathBuf>,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub namespace: String,
    pub metrics_bind_address: SocketAddr,
    pub channel_capacity: usize,
    pub manager: Params,
}

impl Cli {
    /// Validate flags and build the runtime configuration
    pub fn into_config(mut self) -> Result<Config, ControllerError> {
        let log_filter = log_filter(&self.log_level)?;
        if self.channel_capacity == 0 {
            return Err(ControllerError::InvalidConfig("channel capacity must be at least 1".to_string()));
        }
        if self.namespace.trim().is_empty() {
            return Err(ControllerError::InvalidConfig("namespace must not be empty".to_string()));
        }

        let manager = match self.ip_provider {
            IpProvider::Local => {
                let ranges = self
                    .ip_range
                    .as_deref()
                    .map(|r| trim_quotes(r.trim()).to_string())
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        ControllerError::InvalidConfig("--ip-range is required for the local provider".to_string())
                    })?;
                Params::local(ranges, self.db_path.clone())
            }
            IpProvider::Infoblox => {
                if let Some(dir) = self.credentials_directory.clone() {
                    self.apply_credentials(&dir)?;
                }
                let host = HostConfig {
                    host: required(self.infoblox_grid_host.take(), "--infoblox-grid-host")?,
                    version: required(self.infoblox_wapi_version.take(), "--infoblox-wapi-version")?,
                    port: self.infoblox_wapi_port.clone(),
                    username: required(self.infoblox_username.take(), "--infoblox-username")?,
                    password: required(self.infoblox_password.take(), "--infoblox-password")?,
                    ssl_verify: !self.infoblox_ssl_insecure,
                };
                let labels = required(self.infoblox_labels.take(), "--infoblox-labels")?;
                Params::infoblox(host, trim_quotes(labels.trim()), self.infoblox_netview.clone())
            }
        };

        Ok(Config {
            log_filter,
            namespace: self.namespace,
            metrics_bind_address: self.metrics_bind_address,
            channel_capacity: self.channel_capacity,
            manager,
        })
    }

    /// Override Infoblox connection fields with files from `dir`
    fn apply_credentials(&mut self, dir: &Path) -> Result<(), ControllerError> {
        if let Some(v) = read_credential(dir, "infoblox-grid-host")? {
            self.infoblox_grid_host = Some(v);
        }
        if let Some(v) = read_credential(dir, "infoblox-wapi-port")? {
            self.infoblox_wapi_port = v;
        }
        if let Some(v) = read_credential(dir, "infoblox-wapi-version")? {
            self.infoblox_wapi_version = Some(v);
        }
        if let Some(v) = read_credential(dir, "infoblox-username")? {
            self.infoblox_username = Some(v);
        }
        if let Some(v) = read_credential(dir, "infoblox-password")? {
            self.infoblox_password = Some(v);
        }
        Ok(())
    }
}

fn read_credential(dir: &Path, name: &str) -> Result<Option<String>, ControllerError> {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(value) => Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ControllerError::Credentials {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn required(value: Option<String>, flag: &str) -> Result<String, ControllerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ControllerError::InvalidConfig(format!("{} is required for the infoblox provider", flag)))
}

/// Map a log level name onto an `EnvFilter` directive
pub fn log_filter(level: &str) -> Result<String, ControllerError> {
    let directive = match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        other => {
            return Err(ControllerError::InvalidConfig(format!(
                "unknown log level {}; valid levels are DEBUG, INFO, WARNING, ERROR, CRITICAL",
                other
            )))
        }
    };
    Ok(directive.to_string())
}
