//! `deploy` and `remote_add`.
//!
//! A deploy resolves the alias to a registered remote and records a
//! [`Release`] snapshot of the application's service images and environment
//! variables under `<app_id>_releases`.

use super::{load_app, now, resolve_app_name};
use crate::context::Context;
use crate::pipeline::{Pipeline, Step};
use crate::runner::{Operation, Runner};
use crate::toolkit::Toolkit;
use crate::CoreError;
use std::collections::BTreeMap;
use stevedore_schema::validate_service_name;
use stevedore_store::{
    meta_bucket, releases_bucket, App, Evars, Release, Service, APPS_BUCKET, EVARS_KEY,
};
use tracing::info;

pub const NAME: &str = "deploy";
pub const REMOTE_ADD: &str = "remote_add";

pub const DEFAULT_ALIAS: &str = "default";

struct Deploy {
    control: Context,
    alias: String,
    app_name: String,
    app: App,
    target: String,
}

pub fn construct(toolkit: &Toolkit, mut control: Context) -> Result<Box<dyn Operation>, CoreError> {
    let alias = control
        .get_or_insert_with("alias", || DEFAULT_ALIAS.to_owned())
        .to_owned();
    let app_name = resolve_app_name(NAME, toolkit, &mut control)?;
    Ok(Box::new(Deploy {
        control,
        alias,
        app_name,
        app: App::default(),
        target: String::new(),
    }))
}

fn pipeline() -> Pipeline<Deploy> {
    Pipeline::new(NAME)
        .step(Step::abort("load-app", Deploy::load_app))
        .step(Step::abort("resolve-remote", Deploy::resolve_remote))
        .step(Step::abort("announce", Deploy::announce))
        .step(Step::abort("record-release", Deploy::record_release))
}

impl Operation for Deploy {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        pipeline().execute(self, runner)?;
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl Deploy {
    fn load_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.app = load_app(runner.toolkit(), &self.app_name)?;
        Ok(())
    }

    fn resolve_remote(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        self.target = self
            .app
            .remotes
            .get(&self.alias)
            .filter(|t| !t.is_empty())
            .cloned()
            .ok_or_else(|| {
                CoreError::validation(
                    NAME,
                    format!("no remote registered for alias '{}'", self.alias),
                )
            })?;
        self.control.set("remote", self.target.as_str());
        Ok(())
    }

    fn announce(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        self.control
            .display
            .append(format!("Deploying to {}", self.alias));
        Ok(())
    }

    fn record_release(&mut self, runner: &Runner) -> Result<(), CoreError> {
        let toolkit = runner.toolkit();
        let mut services = BTreeMap::new();
        for key in toolkit.store.list_keys(&self.app_name)? {
            let service: Service = toolkit.store.get(&self.app_name, &key)?;
            services.insert(key, service.image);
        }
        let evars: Evars = toolkit
            .store
            .get_or_default(&meta_bucket(&toolkit.app_id), EVARS_KEY)?;

        let release = Release {
            alias: self.alias.clone(),
            target: self.target.clone(),
            app_name: self.app_name.clone(),
            services,
            evars,
            created_at: now(),
        };
        let key = chrono::Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        toolkit
            .store
            .put(&releases_bucket(&toolkit.app_id), &key, &release)?;
        info!("recorded release {key} for {} -> {}", self.alias, self.target);
        self.control.set("release", key);
        Ok(())
    }
}

struct RemoteAdd {
    control: Context,
    alias: String,
    target: String,
    app_name: String,
    app: App,
}

pub fn construct_remote_add(
    toolkit: &Toolkit,
    mut control: Context,
) -> Result<Box<dyn Operation>, CoreError> {
    let alias = control.require(REMOTE_ADD, "alias")?.to_owned();
    validate_service_name(&alias).map_err(|e| CoreError::validation(REMOTE_ADD, e.to_string()))?;
    let target = control.require(REMOTE_ADD, "target")?.to_owned();
    let app_name = resolve_app_name(REMOTE_ADD, toolkit, &mut control)?;
    Ok(Box::new(RemoteAdd {
        control,
        alias,
        target,
        app_name,
        app: App::default(),
    }))
}

fn remote_add_pipeline() -> Pipeline<RemoteAdd> {
    Pipeline::new(REMOTE_ADD)
        .step(Step::abort("load-app", RemoteAdd::load_app))
        .step(Step::abort("set-remote", RemoteAdd::set_remote))
}

impl Operation for RemoteAdd {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        remote_add_pipeline().execute(self, runner)?;
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl RemoteAdd {
    fn load_app(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.app = load_app(runner.toolkit(), &self.app_name)?;
        Ok(())
    }

    fn set_remote(&mut self, runner: &Runner) -> Result<(), CoreError> {
        if let Some(old) = self.app.remotes.insert(self.alias.clone(), self.target.clone()) {
            info!("remote {} changed from {old} to {}", self.alias, self.target);
        }
        runner
            .toolkit()
            .store
            .put(APPS_BUCKET, &self.app_name, &self.app)?;
        self.control
            .display
            .append(format!("Remote {} -> {}", self.alias, self.target));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;

    fn seed(h: &crate::test_support::Harness) {
        h.store()
            .put(APPS_BUCKET, "shop_sim", &App::default())
            .unwrap();
    }

    #[test]
    fn alias_defaults_to_default() {
        let h = harness();
        let unit = construct(h.runner.toolkit(), Context::new("sim")).unwrap();
        assert_eq!(unit.results().get("alias"), Some(DEFAULT_ALIAS));
    }

    #[test]
    fn unknown_alias_is_named_in_error() {
        let h = harness();
        seed(&h);
        let err = h
            .runner
            .run(NAME, Context::new("sim").with("alias", "prod"))
            .unwrap_err();
        assert!(matches!(err.root_cause(), CoreError::Validation { .. }));
        assert!(err.to_string().contains("'prod'"));
    }

    #[test]
    fn deploy_records_release_snapshot() {
        let h = harness();
        seed(&h);
        h.runner
            .run(
                REMOTE_ADD,
                Context::new("sim")
                    .with("alias", "prod")
                    .with("target", "shop-production"),
            )
            .unwrap();
        h.store()
            .put(
                "shop_sim",
                "web",
                &Service {
                    name: "web".to_owned(),
                    image: "nginx:1.27".to_owned(),
                    ..Service::default()
                },
            )
            .unwrap();

        let out = h
            .runner
            .run(NAME, Context::new("sim").with("alias", "prod"))
            .unwrap();
        assert_eq!(out.get("remote"), Some("shop-production"));
        assert_eq!(out.display.messages(), vec!["Deploying to prod"]);

        let key = out.get("release").unwrap();
        let release: Release = h.store().get("shop_releases", key).unwrap();
        assert_eq!(release.target, "shop-production");
        assert_eq!(release.services.get("web").map(String::as_str), Some("nginx:1.27"));
    }

    #[test]
    fn remote_add_requires_target() {
        let h = harness();
        let ctx = Context::new("sim").with("alias", "prod");
        assert!(matches!(
            construct_remote_add(h.runner.toolkit(), ctx),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn remote_add_overwrites_alias() {
        let h = harness();
        seed(&h);
        for target in ["a", "b"] {
            h.runner
                .run(
                    REMOTE_ADD,
                    Context::new("sim").with("alias", "prod").with("target", target),
                )
                .unwrap();
        }
        let app: App = h.store().get(APPS_BUCKET, "shop_sim").unwrap();
        assert_eq!(app.remotes.get("prod").map(String::as_str), Some("b"));
    }
}
