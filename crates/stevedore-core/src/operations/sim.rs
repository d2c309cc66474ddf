//! `sim_start` and `sim_destroy`: bring a whole simulated application up or
//! down by composing `service_setup` and `service_destroy`.

use super::{
    load_app, now, resolve_app_name, service_destroy, service_setup, split_list, PORTAL_SERVICE,
};
use crate::context::Context;
use crate::pipeline::{FailurePolicy, Pipeline, Step};
use crate::runner::{Operation, Runner};
use crate::toolkit::Toolkit;
use crate::CoreError;
use stevedore_schema::{validate_service_name, ServiceDecl};
use stevedore_store::{App, APPS_BUCKET};
use tracing::{debug, info, warn};

pub const START: &str = "sim_start";
pub const DESTROY: &str = "sim_destroy";

/// Render service declarations as the `services` parameter: `name=image,...`.
pub fn encode_services(services: &[ServiceDecl]) -> String {
    services
        .iter()
        .map(|s| format!("{}={}", s.name, s.image))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_services(operation: &str, value: &str) -> Result<Vec<ServiceDecl>, CoreError> {
    split_list(value)
        .map(|entry| -> Result<ServiceDecl, CoreError> {
            let (name, image) = entry
                .split_once('=')
                .map(|(n, i)| (n.trim(), i.trim()))
                .filter(|(_, i)| !i.is_empty())
                .ok_or_else(|| {
                    CoreError::validation(operation, format!("malformed service entry '{entry}'"))
                })?;
            validate_service_name(name).map_err(|e| CoreError::validation(operation, e.to_string()))?;
            Ok(ServiceDecl {
                name: name.to_owned(),
                image: image.to_owned(),
            })
        })
        .collect()
}

struct SimStart {
    control: Context,
    app_name: String,
    services: Vec<ServiceDecl>,
}

pub fn construct_start(
    toolkit: &Toolkit,
    mut control: Context,
) -> Result<Box<dyn Operation>, CoreError> {
    let services = parse_services(START, control.get("services").unwrap_or_default())?;
    let app_name = resolve_app_name(START, toolkit, &mut control)?;
    Ok(Box::new(SimStart {
        control,
        app_name,
        services,
    }))
}

fn start_pipeline() -> Pipeline<SimStart> {
    Pipeline::new(START)
        .step(Step::abort("ensure-app", SimStart::ensure_app))
        .step(Step::abort("announce", SimStart::announce))
        .step(Step::nested(
            "provision-services",
            FailurePolicy::Abort,
            service_setup::NAME,
            SimStart::setup_contexts,
        ))
}

impl Operation for SimStart {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        start_pipeline().execute(self, runner)?;
        info!("{} started with {} service(s)", self.app_name, self.services.len());
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl SimStart {
    fn ensure_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        match toolkit.store.get::<App>(APPS_BUCKET, &self.app_name) {
            Ok(_) => {
                debug!("application {} already exists", self.app_name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let mut app = App {
                    app_id: toolkit.app_id.clone(),
                    env: self.control.env.clone(),
                    created_at: now(),
                    ..App::default()
                };
                let portal_ip = toolkit.pool.lease()?;
                app.global_ips
                    .insert(PORTAL_SERVICE.to_owned(), portal_ip.clone());
                if let Err(e) = toolkit.store.put(APPS_BUCKET, &self.app_name, &app) {
                    if let Err(undo) = toolkit.pool.return_address(&portal_ip) {
                        warn!("failed to return {portal_ip}: {undo}");
                    }
                    return Err(e.into());
                }
                info!("created application {}", self.app_name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn announce(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        self.control
            .display
            .append(format!("Starting {}", self.app_name));
        Ok(())
    }

    fn setup_contexts(&self) -> Vec<Context> {
        self.services
            .iter()
            .map(|s| {
                self.control
                    .derive()
                    .with("name", s.name.as_str())
                    .with("image", s.image.as_str())
                    .with("app_name", self.app_name.as_str())
            })
            .collect()
    }
}

struct SimDestroy {
    control: Context,
    app_name: String,
    app: App,
    services: Vec<String>,
}

pub fn construct_destroy(
    toolkit: &Toolkit,
    mut control: Context,
) -> Result<Box<dyn Operation>, CoreError> {
    let app_name = resolve_app_name(DESTROY, toolkit, &mut control)?;
    Ok(Box::new(SimDestroy {
        control,
        app_name,
        app: App::default(),
        services: Vec::new(),
    }))
}

fn destroy_pipeline() -> Pipeline<SimDestroy> {
    Pipeline::new(DESTROY)
        .step(Step::abort("load-app", SimDestroy::load_app))
        .step(Step::abort("announce", SimDestroy::announce))
        .step(Step::abort("list-services", SimDestroy::list_services))
        .step(Step::nested(
            "destroy-services",
            FailurePolicy::Abort,
            service_destroy::NAME,
            SimDestroy::destroy_contexts,
        ))
        .step(Step::abort(
            "release-app-addresses",
            SimDestroy::release_app_addresses,
        ))
        .step(Step::abort("delete-app", SimDestroy::delete_app))
}

impl Operation for SimDestroy {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        destroy_pipeline().execute(self, runner)?;
        info!("{} destroyed", self.app_name);
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl SimDestroy {
    fn load_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.app = load_app(runner.toolkit(), &self.app_name)?;
        Ok(())
    }

    fn announce(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        self.control
            .display
            .append(format!("Destroying {}", self.app_name));
        Ok(())
    }

    fn list_services(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.services = runner.toolkit().store.list_keys(&self.app_name)?;
        Ok(())
    }

    fn destroy_contexts(&self) -> Vec<Context> {
        self.services
            .iter()
            .map(|name| {
                self.control
                    .derive()
                    .with("name", name.as_str())
                    .with("app_name", self.app_name.as_str())
            })
            .collect()
    }

    fn release_app_addresses(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let pool = &runner.toolkit().pool;
        for ip in self
            .app
            .global_ips
            .values()
            .chain(self.app.local_ips.values())
            .filter(|ip| !ip.is_empty())
        {
            pool.return_address(ip)?;
        }
        Ok(())
    }

    fn delete_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        runner.toolkit().store.delete(APPS_BUCKET, &self.app_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;

    #[test]
    fn parse_services_list() {
        let services = parse_services(START, "web=nginx:1.27, data.db=postgres:16").unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].name, "data.db");
        assert_eq!(services[1].image, "postgres:16");
        assert_eq!(encode_services(&services), "web=nginx:1.27,data.db=postgres:16");
    }

    #[test]
    fn parse_services_rejects_malformed_entries() {
        for bad in ["web", "web=", "=nginx", "../x=nginx"] {
            assert!(
                matches!(
                    parse_services(START, bad),
                    Err(CoreError::Validation { .. })
                ),
                "{bad} should be rejected"
            );
        }
        assert!(parse_services(START, "").unwrap().is_empty());
    }

    #[test]
    fn start_creates_app_with_portal_address() {
        let h = harness();
        let out = h
            .runner
            .run(START, Context::new("sim").with("services", "web=nginx"))
            .unwrap();

        let app: App = h.store().get(APPS_BUCKET, "shop_sim").unwrap();
        assert_eq!(app.global_ip(PORTAL_SERVICE), Some("10.10.0.1"));
        assert_eq!(app.env, "sim");
        assert!(h.store().exists("shop_sim", "web"));
        assert_eq!(
            out.display.messages(),
            vec!["Starting shop_sim", "Provisioning web"]
        );
    }

    #[test]
    fn start_reuses_existing_app() {
        let h = harness();
        h.runner.run(START, Context::new("sim")).unwrap();
        h.runner.run(START, Context::new("sim")).unwrap();
        assert_eq!(h.pool.leased(), vec!["10.10.0.1"]);
    }

    #[test]
    fn failed_app_save_returns_portal_lease() {
        let h = harness();
        let apps_dir = h.store().layout().bucket_dir(APPS_BUCKET);
        std::fs::write(&apps_dir, "not a directory").unwrap();

        let err = h.runner.run(START, Context::new("sim")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Step { ref step, .. } if step == "ensure-app"
        ));
        assert!(h.pool.leased().is_empty());
        assert_eq!(h.pool.returned(), vec!["10.10.0.1"]);
    }

    #[test]
    fn destroy_returns_every_lease() {
        let h = harness();
        h.runner
            .run(START, Context::new("sim").with("services", "web=nginx,db=postgres"))
            .unwrap();
        assert_eq!(h.pool.leased().len(), 5);

        h.runner.run(DESTROY, Context::new("sim")).unwrap();
        assert!(h.pool.leased().is_empty());
        assert!(!h.store().exists(APPS_BUCKET, "shop_sim"));
        assert!(h.store().list_keys("shop_sim").unwrap().is_empty());
        assert!(h.backend.containers().is_empty());
    }

    #[test]
    fn destroy_of_unknown_app_fails_at_load() {
        let h = harness();
        let err = h.runner.run(DESTROY, Context::new("sim")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Step { ref step, .. } if step == "load-app"
        ));
    }

    #[test]
    fn nested_failure_aborts_start() {
        let h = harness();
        h.backend.fail_on("create_container");
        let err = h
            .runner
            .run(START, Context::new("sim").with("services", "web=nginx"))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Step { ref step, .. } if step == "provision-services"
        ));
        assert!(matches!(err.root_cause(), CoreError::Runtime(_)));
    }
}
