//! Core orchestration engine for Stevedore.
//!
//! Named operations (`service_destroy`, `sim_start`, `deploy`, ...) are
//! looked up in a `Registry`, constructed against a `Context` and executed by
//! the `Runner` as a `Pipeline` of steps, each declaring whether its failure
//! aborts the operation, is logged and skipped, or is swallowed. Steps may
//! invoke other operations through the same `Runner`.

pub mod concurrency;
pub mod context;
pub mod operations;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod toolkit;

pub use concurrency::StoreLock;
pub use context::{Context, Display};
pub use pipeline::{Action, FailurePolicy, Pipeline, PipelineReport, Step, StepOutcome};
pub use registry::{Constructor, Registry, RegistryBuilder};
pub use runner::{Operation, Runner};
pub use toolkit::Toolkit;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("operation '{0}' is already registered")]
    DuplicateOperation(String),
    #[error("{operation}: {message}")]
    Validation { operation: String, message: String },
    #[error("{operation}: step '{step}' failed: {source}")]
    Step {
        operation: String,
        step: String,
        source: Box<CoreError>,
    },
    #[error("config error: {0}")]
    Config(#[from] stevedore_schema::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] stevedore_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] stevedore_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn validation(operation: &str, message: impl Into<String>) -> Self {
        CoreError::Validation {
            operation: operation.to_owned(),
            message: message.into(),
        }
    }

    /// Innermost error, looking through nested step failures.
    pub fn root_cause(&self) -> &CoreError {
        match self {
            CoreError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_display_names_operation_and_step() {
        let e = CoreError::Step {
            operation: "service_destroy".to_owned(),
            step: "detach-network".to_owned(),
            source: Box::new(CoreError::Runtime(
                stevedore_runtime::RuntimeError::NetworkFailed("boom".to_owned()),
            )),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("service_destroy: step 'detach-network' failed"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn root_cause_unwraps_nested_steps() {
        let inner = CoreError::UnknownOperation("x".to_owned());
        let e = CoreError::Step {
            operation: "outer".to_owned(),
            step: "a".to_owned(),
            source: Box::new(CoreError::Step {
                operation: "inner".to_owned(),
                step: "b".to_owned(),
                source: Box::new(inner),
            }),
        };
        assert!(matches!(e.root_cause(), CoreError::UnknownOperation(_)));
    }

    #[test]
    fn validation_display() {
        let e = CoreError::validation("deploy", "missing required parameter 'alias'");
        assert_eq!(e.to_string(), "deploy: missing required parameter 'alias'");
    }
}
