//! Execution-side collaborators for Stevedore.
//!
//! This crate implements the pieces the orchestrator drives but does not own:
//! the pluggable `ContainerBackend` trait with a docker/podman CLI backend,
//! the `NetworkProvider` trait with an `ip`/`iptables` host provider, and
//! in-memory mocks of both (plus a mock `AddressPool`) that record every
//! call for tests and dry runs.

pub mod backend;
pub mod docker;
pub mod mock;
pub mod network;

pub use backend::{select_backend, ContainerBackend, ContainerSpec};
pub use mock::{MockBackend, MockNetwork, MockPool};
pub use network::{select_network, HostNetwork, NetworkProvider};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("container '{0}' does not exist")]
    ContainerNotFound(String),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("network operation failed: {0}")]
    NetworkFailed(String),
}
