//! Record storage, domain records and address leasing for Stevedore.
//!
//! This crate provides the persistence layer: a bucket/key `RecordStore` that
//! writes checksummed JSON records atomically, `StoreLayout` for directory
//! structure and format versioning, the domain records the orchestrator
//! reads and writes (`App`, `Service`, `Evars`, `Release`), and `DhcpPool`,
//! a file-backed `AddressPool` handing out IPv4 leases from a fixed range.

pub mod dhcp;
pub mod layout;
pub mod models;
pub mod records;

pub use dhcp::{AddressPool, DhcpPool};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use models::{
    app_name, is_reserved_bucket, meta_bucket, releases_bucket, App, Evars, Release, Service,
    APPS_BUCKET, DHCP_BUCKET, EVARS_KEY, RESERVED_ENV_TAGS,
};
pub use records::{validate_key, RecordStore};

use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("integrity check failed for record '{bucket}/{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        bucket: String,
        key: String,
        expected: String,
        actual: String,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid store key: {0}")]
    InvalidKey(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("address pool {start}-{end} is exhausted")]
    PoolExhausted { start: Ipv4Addr, end: Ipv4Addr },
    #[error("invalid address: '{0}'")]
    InvalidAddress(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
