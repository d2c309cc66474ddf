//! Built-in operations.
//!
//! Each operation module exposes a `NAME` and a `construct` function with the
//! [`Constructor`](crate::Constructor) signature. Constructors only read the
//! context (filling defaults such as `app_name`) and build a typed parameter
//! struct; all side effects happen in the operation's pipeline.

pub mod deploy;
pub mod evars;
pub mod service_destroy;
pub mod service_setup;
pub mod sim;

use crate::context::Context;
use crate::registry::RegistryBuilder;
use crate::toolkit::Toolkit;
use crate::CoreError;
use stevedore_schema::validate_service_name;
use stevedore_store::{app_name, is_reserved_bucket, App, APPS_BUCKET};

/// Service whose external address always belongs to the application.
pub const PORTAL_SERVICE: &str = "portal";

pub fn register_builtin(builder: RegistryBuilder) -> Result<RegistryBuilder, CoreError> {
    builder
        .register(deploy::NAME, deploy::construct)?
        .register(deploy::REMOTE_ADD, deploy::construct_remote_add)?
        .register(evars::ADD, evars::construct_add)?
        .register(evars::REMOVE, evars::construct_remove)?
        .register(service_destroy::NAME, service_destroy::construct)?
        .register(service_setup::NAME, service_setup::construct)?
        .register(sim::START, sim::construct_start)?
        .register(sim::DESTROY, sim::construct_destroy)
}

/// Container name for a service: `stevedore_<app_name>_<service>`.
pub fn container_name(app_name: &str, service: &str) -> String {
    format!("stevedore_{app_name}_{service}")
}

/// Default `app_name` to `<app_id>_<env>` and return it. Names that would
/// share a bucket with the variable table or the release log are rejected.
fn resolve_app_name(
    operation: &str,
    toolkit: &Toolkit,
    control: &mut Context,
) -> Result<String, CoreError> {
    let env = control.env.clone();
    let name = control
        .get_or_insert_with("app_name", || app_name(&toolkit.app_id, &env))
        .to_owned();
    if is_reserved_bucket(&toolkit.app_id, &name) {
        return Err(CoreError::validation(
            operation,
            format!("application name '{name}' is reserved; use another env tag"),
        ));
    }
    Ok(name)
}

fn require_service_name(operation: &str, control: &Context) -> Result<String, CoreError> {
    let name = control.require(operation, "name")?;
    validate_service_name(name).map_err(|e| CoreError::validation(operation, e.to_string()))?;
    Ok(name.to_owned())
}

fn load_app(toolkit: &Toolkit, app_name: &str) -> Result<App, CoreError> {
    Ok(toolkit.store.get(APPS_BUCKET, app_name)?)
}

/// Split a comma-separated parameter, trimming blanks.
fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
