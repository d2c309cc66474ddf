use crate::RuntimeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    /// Address the container should answer on, if the backend can pin one.
    pub ip: Option<String>,
    pub env: Vec<(String, String)>,
}

pub trait ContainerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    /// Remove a container. A missing container is reported as
    /// [`RuntimeError::ContainerNotFound`].
    fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;
}

/// `container_network` is honoured by backends that can pin addresses.
pub fn select_backend(
    name: &str,
    container_network: Option<&str>,
) -> Result<Box<dyn ContainerBackend>, RuntimeError> {
    match name {
        "docker" => {
            let backend = crate::docker::DockerBackend::new();
            Ok(Box::new(match container_network {
                Some(network) => backend.with_network(network),
                None => backend,
            }))
        }
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
