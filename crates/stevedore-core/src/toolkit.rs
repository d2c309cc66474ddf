use crate::CoreError;
use std::path::Path;
use std::sync::Arc;
use stevedore_runtime::{select_backend, select_network, ContainerBackend, NetworkProvider};
use stevedore_schema::ProjectConfig;
use stevedore_store::{AddressPool, DhcpPool, RecordStore, StoreLayout};
use tracing::warn;

/// Collaborators handed to every constructor and unit.
#[derive(Clone)]
pub struct Toolkit {
    /// Application id; operations derive `app_name` and bucket names from it.
    pub app_id: String,
    pub store: RecordStore,
    pub backend: Arc<dyn ContainerBackend>,
    pub network: Arc<dyn NetworkProvider>,
    pub pool: Arc<dyn AddressPool>,
}

impl Toolkit {
    /// Wire up the collaborators named in `config` over the store at
    /// `store_root`, initializing the store layout if needed.
    pub fn from_config(
        store_root: &Path,
        config: &ProjectConfig,
        app_id: &str,
    ) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(store_root);
        layout.initialize()?;
        let store = RecordStore::new(layout);
        let runtime = &config.runtime;
        let backend: Arc<dyn ContainerBackend> = Arc::from(select_backend(
            &runtime.backend,
            runtime.container_network.as_deref(),
        )?);
        if !backend.available() {
            warn!("container backend '{}' is not available on this host", backend.name());
        }
        let network: Arc<dyn NetworkProvider> =
            Arc::from(select_network(&runtime.network, &runtime.interface)?);
        let pool: Arc<dyn AddressPool> = Arc::new(DhcpPool::new(store.clone(), config.dhcp));
        Ok(Self {
            app_id: app_id.to_owned(),
            store,
            backend,
            network,
            pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stevedore_schema::parse_config_str;

    #[test]
    fn from_config_selects_mocks() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config_str(
            r#"
[runtime]
backend = "mock"
network = "mock"
"#,
        )
        .unwrap();
        let toolkit = Toolkit::from_config(dir.path(), &config, "shop").unwrap();
        assert_eq!(toolkit.app_id, "shop");
        assert_eq!(toolkit.backend.name(), "mock");
        assert_eq!(toolkit.network.name(), "mock");
        assert!(toolkit.store.layout().buckets_dir().is_dir());
    }

    #[test]
    fn from_config_wires_runtime_section() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config_str(
            r#"
[runtime]
backend = "docker"
network = "host"
container_network = "stevedore"
interface = "eth1"
"#,
        )
        .unwrap();
        let toolkit = Toolkit::from_config(dir.path(), &config, "shop").unwrap();
        assert_eq!(toolkit.backend.name(), "docker");
        assert_eq!(toolkit.network.name(), "host");
    }

    #[test]
    fn from_config_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.runtime.backend = "vmware".to_owned();
        assert!(matches!(
            Toolkit::from_config(dir.path(), &config, "shop"),
            Err(CoreError::Runtime(_))
        ));
    }
}
