pub mod completions;
pub mod deploy;
pub mod env;
pub mod ops;
pub mod remote;
pub mod service;
pub mod sim;

use std::path::{Path, PathBuf};
use stevedore_core::{Context, CoreError, Display, Registry, Runner, StoreLock, Toolkit};
use stevedore_schema::{validate_service_name, ProjectConfig};
use stevedore_store::{app_name, RecordStore, StoreLayout, RESERVED_ENV_TAGS};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Pad to `width` before styling so escape codes do not eat the padding.
pub fn styled_address(ip: &str, width: usize) -> String {
    use console::Style;
    if ip.is_empty() {
        Style::new().dim().apply_to(format!("{:<width$}", "-")).to_string()
    } else {
        Style::new().green().apply_to(format!("{ip:<width$}")).to_string()
    }
}

/// Render an engine error, tagging store failures so they map to
/// [`EXIT_STORE_ERROR`]. A missing record is an ordinary failure.
pub fn describe(e: &CoreError) -> String {
    match e.root_cause() {
        CoreError::Store(store) if !store.is_not_found() => format!("store error: {e}"),
        _ => e.to_string(),
    }
}

/// Everything a command needs: the loaded project config and a runner wired
/// to the store and the configured collaborators.
pub struct Session {
    pub runner: Runner,
    pub config: ProjectConfig,
    pub store_root: PathBuf,
    pub env: String,
    pub json: bool,
    /// Fail instead of waiting when another process holds the store lock.
    pub no_wait: bool,
}

impl Session {
    pub fn open(store_root: &Path, config_path: &Path, env: &str, json: bool) -> Result<Self, String> {
        let config =
            ProjectConfig::load_or_default(config_path).map_err(|e| format!("config error: {e}"))?;
        validate_service_name(env).map_err(|e| format!("config error: bad --env: {e}"))?;
        if RESERVED_ENV_TAGS.contains(&env) {
            return Err(format!("config error: env tag '{env}' is reserved"));
        }

        let project_dir = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::current_dir().map_err(|e| format!("failed to read current dir: {e}"))?,
        };
        let app_id = config.app_id(&project_dir);

        let toolkit =
            Toolkit::from_config(store_root, &config, &app_id).map_err(|e| e.to_string())?;
        let registry = Registry::builtin().map_err(|e| e.to_string())?;
        Ok(Self {
            runner: Runner::new(registry, toolkit),
            config,
            store_root: store_root.to_path_buf(),
            env: env.to_owned(),
            json,
            no_wait: false,
        })
    }

    pub fn store(&self) -> &RecordStore {
        &self.runner.toolkit().store
    }

    pub fn app_id(&self) -> &str {
        &self.runner.toolkit().app_id
    }

    pub fn app_name(&self) -> String {
        app_name(self.app_id(), &self.env)
    }

    /// Fresh context; progress messages go to stderr unless JSON output was
    /// requested.
    pub fn context(&self) -> Context {
        let display = if self.json {
            Display::new()
        } else {
            Display::echoing()
        };
        Context::new(self.env.as_str()).with_display(display)
    }

    #[must_use]
    pub fn with_no_wait(mut self, no_wait: bool) -> Self {
        self.no_wait = no_wait;
        self
    }

    pub fn lock(&self) -> Result<StoreLock, String> {
        let path = StoreLayout::new(&self.store_root).lock_file();
        if self.no_wait {
            StoreLock::try_acquire(&path)
                .map_err(|e| format!("store lock: {e}"))?
                .ok_or_else(|| "store lock: held by another stevedore process".to_owned())
        } else {
            StoreLock::acquire(&path).map_err(|e| format!("store lock: {e}"))
        }
    }

    pub fn run(&self, operation: &str, context: Context) -> Result<Context, String> {
        self.runner
            .run(operation, context)
            .map_err(|e| describe(&e))
    }

    /// Print an operation's results as JSON; human output already went
    /// through the display.
    pub fn report(&self, context: &Context) -> Result<u8, String> {
        if self.json {
            let payload = serde_json::json!({
                "env": context.env,
                "meta": context.meta,
                "messages": context.display.messages(),
            });
            println!("{}", json_pretty(&payload)?);
        }
        Ok(EXIT_SUCCESS)
    }
}
