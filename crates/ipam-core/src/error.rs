//! Error types for the allocation engine

use infoblox_client::InfobloxError;
use thiserror::Error;

/// Malformed pool configuration or address range
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid address range '{0}'")]
    InvalidRange(String),

    #[error("Invalid IPv4 address '{0}'")]
    InvalidAddress(String),

    #[error("Range start {start} is after range end {end}")]
    Reversed { start: String, end: String },

    #[error("Mask mismatch in range '{0}': both endpoints must share one mask")]
    MaskMismatch(String),

    #[error("Address {address} is outside network {network}")]
    OutsideNetwork { address: String, network: String },

    #[error("Range '{range}' expands to {size} addresses, more than {max}")]
    TooLarge { range: String, size: u64, max: u64 },
}

/// Address pool store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create store directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Pool range error: {0}")]
    Range(#[from] RangeError),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Errors surfaced by an allocation manager.
///
/// Everything except [`ManagerError::Config`] is an allocation-path error and
/// ends up as a failed result at the coordinator.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown pool: {0}")]
    UnknownPool(String),

    #[error("No available addresses in pool: {0}")]
    PoolExhausted(String),

    #[error("Address {address} in pool {pool} is already allocated")]
    Conflict { pool: String, address: String },

    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Infoblox error: {0}")]
    Infoblox(#[from] InfobloxError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<RangeError> for ManagerError {
    fn from(err: RangeError) -> Self {
        ManagerError::Config(err.to_string())
    }
}
