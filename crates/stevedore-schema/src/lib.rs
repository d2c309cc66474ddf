//! Project configuration for Stevedore.
//!
//! This crate defines the schema layer: TOML parsing of `stevedore.toml`
//! (`ProjectConfig`), collaborator selection (`RuntimeSection`), the DHCP
//! address range (`DhcpSection`), declared services (`ServiceDecl`) and the
//! naming rules shared by every other crate (`validate_service_name`).

pub mod config;
pub mod names;

pub use config::{
    parse_config_file, parse_config_str, ConfigError, DhcpSection, ProjectConfig, RuntimeSection,
    ServiceDecl, CONFIG_FILE_NAME,
};
pub use names::{evar_prefix, validate_evar_key, validate_service_name};
