use crate::context::Context;
use crate::registry::Registry;
use crate::toolkit::Toolkit;
use crate::CoreError;
use tracing::{debug, info};

/// An executable unit produced by a registered constructor.
pub trait Operation {
    /// Run the unit's steps. The runner is passed back in so steps can reach
    /// the collaborators and invoke other operations.
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError>;

    /// The context as left by `process`.
    fn results(self: Box<Self>) -> Context;
}

/// Single entry point for executing named operations.
pub struct Runner {
    registry: Registry,
    toolkit: Toolkit,
}

impl Runner {
    pub fn new(registry: Registry, toolkit: Toolkit) -> Self {
        Self { registry, toolkit }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Resolve `name`, construct it against `context`, process it and hand
    /// back the resulting context. Re-entrant: steps call this for nested
    /// operations.
    pub fn run(&self, name: &str, context: Context) -> Result<Context, CoreError> {
        let constructor = self.registry.lookup(name)?;
        debug!("constructing {name} (env {})", context.env);
        let mut unit = constructor(&self.toolkit, context)?;
        info!("running {name}");
        unit.process(self)?;
        debug!("{name} finished");
        Ok(unit.results())
    }
}
