//! `service_setup`: provision a single service.
//!
//! The service record is saved before any host mutation, so a later
//! `service_destroy` always finds the leased addresses even when a following
//! step aborts. Re-running setup reuses the addresses already on record.
//! Leases taken before the record is saved are returned if reserving or
//! saving fails.

use super::{container_name, load_app, now, require_service_name, resolve_app_name};
use crate::context::Context;
use crate::pipeline::{Pipeline, Step};
use crate::runner::{Operation, Runner};
use crate::toolkit::Toolkit;
use crate::CoreError;
use stevedore_runtime::ContainerSpec;
use stevedore_schema::evar_prefix;
use stevedore_store::{meta_bucket, App, Evars, Service, EVARS_KEY};
use tracing::{debug, info, warn};

pub const NAME: &str = "service_setup";

struct Params {
    name: String,
    image: String,
    app_name: String,
}

struct ServiceSetup {
    control: Context,
    params: Params,
    app: App,
    service: Service,
    fresh_leases: Vec<String>,
}

pub fn construct(toolkit: &Toolkit, mut control: Context) -> Result<Box<dyn Operation>, CoreError> {
    let name = require_service_name(NAME, &control)?;
    let image = control.require(NAME, "image")?.to_owned();
    let app_name = resolve_app_name(NAME, toolkit, &mut control)?;
    Ok(Box::new(ServiceSetup {
        control,
        params: Params {
            name,
            image,
            app_name,
        },
        app: App::default(),
        service: Service::default(),
        fresh_leases: Vec::new(),
    }))
}

fn pipeline() -> Pipeline<ServiceSetup> {
    Pipeline::new(NAME)
        .step(Step::abort("load-app", ServiceSetup::load_app))
        .step(Step::swallow("load-service", ServiceSetup::load_service))
        .step(Step::abort("announce", ServiceSetup::announce))
        .step(Step::abort("reserve-addresses", ServiceSetup::reserve_addresses))
        .step(Step::abort("save-service", ServiceSetup::save_service))
        .step(Step::abort("attach-network", ServiceSetup::attach_network))
        .step(Step::abort("start-container", ServiceSetup::start_container))
        .step(Step::abort("add-evars", ServiceSetup::add_evars))
}

impl Operation for ServiceSetup {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        pipeline().execute(self, runner)?;
        info!(
            "provisioned {} at {} ({})",
            self.params.name, self.service.external_ip, self.service.internal_ip
        );
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl ServiceSetup {
    fn host_key(&self) -> String {
        format!("{}_HOST", evar_prefix(&self.params.name))
    }

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
            .append(format!("Provisioning {}", self.params.name));
        Ok(())
    }

    fn reserve_addresses(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let pool = &runner.toolkit().pool;
        let name = self.params.name.clone();

        let external_ip = match self.app.global_ip(&name) {
            Some(ip) => ip.to_owned(),
            None if !self.service.external_ip.is_empty() => self.service.external_ip.clone(),
            None => {
                let ip = pool.lease()?;
                self.fresh_leases.push(ip.clone());
                ip
            }
        };
        let internal_ip = match self.app.local_ip(&name) {
            Some(ip) => ip.to_owned(),
            None if !self.service.internal_ip.is_empty() => self.service.internal_ip.clone(),
            None => match pool.lease() {
                Ok(ip) => {
                    self.fresh_leases.push(ip.clone());
                    ip
                }
                Err(e) => {
                    self.return_fresh_leases(runner);
                    return Err(e.into());
                }
            },
        };

        self.service.external_ip = external_ip;
        self.service.internal_ip = internal_ip;
        self.control.set("external_ip", self.service.external_ip.as_str());
        self.control.set("internal_ip", self.service.internal_ip.as_str());
        Ok(())
    }

    /// Give back leases taken by this run that no record owns yet.
    fn return_fresh_leases(&mut self, runner: &Runner) {
        let pool = &runner.toolkit().pool;
        for ip in self.fresh_leases.drain(..) {
            if let Err(e) = pool.return_address(&ip) {
                warn!("failed to return {ip}: {e}");
            }
        }
    }

    fn save_service(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.service.name = self.params.name.clone();
        self.service.image = self.params.image.clone();
        if self.service.created_at.is_empty() {
            self.service.created_at = now();
        }
        let saved = runner
            .toolkit()
            .store
            .put(&self.params.app_name, &self.params.name, &self.service);
        if let Err(e) = saved {
            self.return_fresh_leases(runner);
            return Err(e.into());
        }
        self.fresh_leases.clear();
        Ok(())
    }

    fn attach_network(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let network = &runner.toolkit().network;
        network.add_address(&self.service.external_ip)?;
        network.add_nat(&self.service.external_ip, &self.service.internal_ip)?;
        Ok(())
    }

    fn start_container(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        let evars: Evars = toolkit
            .store
            .get_or_default(&meta_bucket(&toolkit.app_id), EVARS_KEY)?;

        let mut env: Vec<(String, String)> = evars
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        env.push((self.host_key(), self.service.internal_ip.clone()));

        let spec = ContainerSpec {
            name: container_name(&self.params.app_name, &self.params.name),
            image: self.params.image.clone(),
            hostname: self.params.name.clone(),
            ip: Some(self.service.internal_ip.clone()).filter(|ip| !ip.is_empty()),
            env,
        };
        debug!("creating container {} from {}", spec.name, spec.image);
        toolkit.backend.create_container(&spec)?;
        Ok(())
    }

    fn add_evars(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        let bucket = meta_bucket(&toolkit.app_id);
        let mut evars: Evars = toolkit.store.get_or_default(&bucket, EVARS_KEY)?;
        evars.set(self.host_key(), self.service.internal_ip.clone());
        toolkit.store.put(&bucket, EVARS_KEY, &evars)?;
        Ok(())
    }
}
