use crate::names::validate_service_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "stevedore.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("service '{0}' is declared more than once")]
    DuplicateService(String),
    #[error("service '{0}' has an empty image")]
    EmptyImage(String),
    #[error("invalid dhcp range: {start} is after {end}")]
    InvalidRange { start: Ipv4Addr, end: Ipv4Addr },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Application id. Defaults to the project directory name.
    #[serde(default)]
    pub app: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub dhcp: DhcpSection,
    #[serde(default)]
    pub services: Vec<ServiceDecl>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_network")]
    pub network: String,
    /// User-defined container network. Containers only receive their leased
    /// internal address when attached to one.
    #[serde(default)]
    pub container_network: Option<String>,
    /// Host interface external addresses are bound to.
    #[serde(default = "default_interface")]
    pub interface: String,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            network: default_network(),
            container_network: None,
            interface: default_interface(),
        }
    }
}

fn default_backend() -> String {
    "docker".to_owned()
}

fn default_network() -> String {
    "host".to_owned()
}

fn default_interface() -> String {
    "lo".to_owned()
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DhcpSection {
    #[serde(default = "default_range_start")]
    pub start: Ipv4Addr,
    #[serde(default = "default_range_end")]
    pub end: Ipv4Addr,
}

impl Default for DhcpSection {
    fn default() -> Self {
        Self {
            start: default_range_start(),
            end: default_range_end(),
        }
    }
}

fn default_range_start() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 99, 50)
}

fn default_range_end() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 99, 254)
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceDecl {
    pub name: String,
    pub image: String,
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(app) = &self.app {
            validate_app_id(app)?;
        }
        if self.dhcp.start > self.dhcp.end {
            return Err(ConfigError::InvalidRange {
                start: self.dhcp.start,
                end: self.dhcp.end,
            });
        }
        let mut seen = BTreeSet::new();
        for svc in &self.services {
            validate_service_name(&svc.name)?;
            if svc.image.trim().is_empty() {
                return Err(ConfigError::EmptyImage(svc.name.clone()));
            }
            if !seen.insert(svc.name.as_str()) {
                return Err(ConfigError::DuplicateService(svc.name.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the application id: the explicit `app` key, or the project
    /// directory name with anything outside `[a-z0-9_-]` mapped to `-`.
    pub fn app_id(&self, project_dir: &Path) -> String {
        if let Some(app) = &self.app {
            return app.clone();
        }
        let raw = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        let id: String = raw
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if id.is_empty() {
            "app".to_owned()
        } else {
            id
        }
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            parse_config_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

fn validate_app_id(app: &str) -> Result<(), ConfigError> {
    if app.is_empty() || app.len() > 64 {
        return Err(ConfigError::InvalidName(
            "app id must be 1-64 characters".to_owned(),
        ));
    }
    if !app
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ConfigError::InvalidName(format!(
            "app id '{app}' must match [a-zA-Z0-9_-]"
        )));
    }
    Ok(())
}

pub fn parse_config_str(input: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}
