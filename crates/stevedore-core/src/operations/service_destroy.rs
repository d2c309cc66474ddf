//! `service_destroy`: tear a single service down.
//!
//! Steps, in order:
//!
//! | step | policy |
//! |---|---|
//! | load-app | abort |
//! | load-service | swallow (a missing record is a valid target) |
//! | announce | abort |
//! | remove-container | log and continue (the container may already be gone) |
//! | detach-network | abort |
//! | remove-evars | abort |
//! | delete-service | abort |
//!
//! Addresses owned by the application are never returned to the pool: the
//! external address of `portal` or of any service listed in `global_ips`,
//! and the internal address of any service listed in `local_ips`.

use super::{container_name, load_app, require_service_name, resolve_app_name, PORTAL_SERVICE};
use crate::context::Context;
use crate::pipeline::{Pipeline, Step};
use crate::runner::{Operation, Runner};
use crate::toolkit::Toolkit;
use crate::CoreError;
use stevedore_schema::evar_prefix;
use stevedore_store::{meta_bucket, App, Evars, Service, EVARS_KEY};
use tracing::debug;

pub const NAME: &str = "service_destroy";

struct Params {
    name: String,
    app_name: String,
}

struct ServiceDestroy {
    control: Context,
    params: Params,
    app: App,
    service: Service,
}

pub fn construct(toolkit: &Toolkit, mut control: Context) -> Result<Box<dyn Operation>, CoreError> {
    let name = require_service_name(NAME, &control)?;
    let app_name = resolve_app_name(NAME, toolkit, &mut control)?;
    Ok(Box::new(ServiceDestroy {
        control,
        params: Params { name, app_name },
        app: App::default(),
        service: Service::default(),
    }))
}

fn pipeline() -> Pipeline<ServiceDestroy> {
    Pipeline::new(NAME)
        .step(Step::abort("load-app", ServiceDestroy::load_app))
        .step(Step::swallow("load-service", ServiceDestroy::load_service))
        .step(Step::abort("announce", ServiceDestroy::announce))
        .step(Step::log_and_continue(
            "remove-container",
            ServiceDestroy::remove_container,
        ))
        .step(Step::abort("detach-network", ServiceDestroy::detach_network))
        .step(Step::abort("remove-evars", ServiceDestroy::remove_evars))
        .step(Step::abort("delete-service", ServiceDestroy::delete_service))
}

impl Operation for ServiceDestroy {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let report = pipeline().execute(self, runner)?;
        if report.failures() > 0 {
            debug!(
                "{NAME} {} finished with {} absorbed failure(s)",
                self.params.name,
                report.failures()
            );
        }
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl ServiceDestroy {
    fn load_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.app = load_app(runner.toolkit(), &self.params.app_name)?;
        Ok(())
    }

    fn load_service(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.service = runner
            .toolkit()
            .store
            .get(&self.params.app_name, &self.params.name)?;
        Ok(())
    }

    fn announce(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        self.control
            .display
            .append(format!("Destroying {}", self.params.name));
        Ok(())
    }

    fn remove_container(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let container = container_name(&self.params.app_name, &self.params.name);
        runner.toolkit().backend.remove_container(&container)?;
        Ok(())
    }

    fn detach_network(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        let name = self.params.name.as_str();
        let service = &self.service;

        toolkit
            .network
            .remove_nat(&service.external_ip, &service.internal_ip)?;
        toolkit.network.remove_address(&service.external_ip)?;

        if name != PORTAL_SERVICE && self.app.global_ip(name).is_none() {
            toolkit.pool.return_address(&service.external_ip)?;
        } else {
            debug!("keeping application-owned external address of {name}");
        }

        if self.app.local_ip(name).is_none() {
            toolkit.pool.return_address(&service.internal_ip)?;
        } else {
            debug!("keeping application-level internal address of {name}");
        }

        Ok(())
    }

    fn remove_evars(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        let bucket = meta_bucket(&toolkit.app_id);
        let mut evars: Evars = toolkit.store.get_or_default(&bucket, EVARS_KEY)?;

        let prefix = evar_prefix(&self.params.name);
        let removed = evars.remove_prefixed(&prefix);
        debug!("removing {} variable(s) with prefix {prefix}", removed.len());

        toolkit.store.put(&bucket, EVARS_KEY, &evars)?;
        Ok(())
    }

    fn delete_service(&mut self, runner: &Runner) -> Result<(), CoreError> {
        runner
            .toolkit()
            .store
            .delete(&self.params.app_name, &self.params.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, Harness};
    use stevedore_store::APPS_BUCKET;

    fn seed(h: &Harness, app: &App, service: &Service) {
        h.store().put(APPS_BUCKET, "shop_sim", app).unwrap();
        h.store().put("shop_sim", &service.name, service).unwrap();
    }

    fn web() -> Service {
        Service {
            name: "web".to_owned(),
            image: "nginx".to_owned(),
            external_ip: "192.168.99.60".to_owned(),
            internal_ip: "10.10.0.60".to_owned(),
            created_at: String::new(),
        }
    }

    fn app() -> App {
        App {
            app_id: "shop".to_owned(),
            env: "sim".to_owned(),
            ..App::default()
        }
    }

    #[test]
    fn step_order_and_names() {
        assert_eq!(
            pipeline().step_names(),
            vec![
                "load-app",
                "load-service",
                "announce",
                "remove-container",
                "detach-network",
                "remove-evars",
                "delete-service",
            ]
        );
    }

    #[test]
    fn constructor_defaults_app_name() {
        let h = harness();
        let ctx = Context::new("sim").with("name", "web");
        let unit = construct(h.runner.toolkit(), ctx).unwrap();
        assert_eq!(unit.results().get("app_name"), Some("shop_sim"));
    }

    #[test]
    fn constructor_keeps_explicit_app_name() {
        let h = harness();
        let ctx = Context::new("sim")
            .with("name", "web")
            .with("app_name", "other_dev");
        let unit = construct(h.runner.toolkit(), ctx).unwrap();
        assert_eq!(unit.results().get("app_name"), Some("other_dev"));
    }

    #[test]
    fn constructor_rejects_invalid_names() {
        let h = harness();
        for bad in ["", "../etc", ".hidden"] {
            let ctx = Context::new("sim").with("name", bad);
            assert!(matches!(
                construct(h.runner.toolkit(), ctx),
                Err(CoreError::Validation { .. })
            ));
        }
    }

    #[test]
    fn announces_destruction() {
        let h = harness();
        seed(&h, &app(), &web());
        let out = h
            .runner
            .run(NAME, Context::new("sim").with("name", "web"))
            .unwrap();
        assert_eq!(out.display.messages(), vec!["Destroying web"]);
    }

    #[test]
    fn missing_app_aborts_before_any_side_effect() {
        let h = harness();
        let err = h
            .runner
            .run(NAME, Context::new("sim").with("name", "web"))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Step { ref step, .. } if step == "load-app"
        ));
        assert!(h.backend.calls().is_empty());
        assert!(h.network.calls().is_empty());
        assert!(h.pool.returned().is_empty());
    }

    #[test]
    fn pool_return_failure_aborts_before_evars() {
        let h = harness();
        seed(&h, &app(), &web());
        h.pool.fail_on("return_address");
        assert!(h
            .runner
            .run(NAME, Context::new("sim").with("name", "web"))
            .is_err());
        assert!(h.store().exists("shop_sim", "web"));
    }
}
