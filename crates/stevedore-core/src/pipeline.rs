//! Ordered step execution with declared failure policies.
//!
//! A [`Pipeline`] is a list of named [`Step`]s run strictly in order over an
//! operation's state. Each step declares a [`FailurePolicy`]; the executor
//! is the only place that decides what a failing step means.

use crate::context::Context;
use crate::runner::Runner;
use crate::CoreError;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the pipeline and return the error.
    Abort,
    /// Log the error and carry on with the next step.
    LogAndContinue,
    /// Drop the error without logging it above trace level.
    Swallow,
}

pub type StepFn<S> = fn(&mut S, &Runner) -> Result<(), CoreError>;
pub type DeriveFn<S> = fn(&S) -> Vec<Context>;

pub enum Action<S> {
    Run(StepFn<S>),
    /// Run `operation` once per derived context, in order. The first failure
    /// is the step's failure.
    Nested {
        operation: &'static str,
        contexts: DeriveFn<S>,
    },
}

pub struct Step<S> {
    pub name: &'static str,
    pub policy: FailurePolicy,
    pub action: Action<S>,
}

impl<S> Step<S> {
    pub fn abort(name: &'static str, f: StepFn<S>) -> Self {
        Self {
            name,
            policy: FailurePolicy::Abort,
            action: Action::Run(f),
        }
    }

    pub fn log_and_continue(name: &'static str, f: StepFn<S>) -> Self {
        Self {
            name,
            policy: FailurePolicy::LogAndContinue,
            action: Action::Run(f),
        }
    }

    pub fn swallow(name: &'static str, f: StepFn<S>) -> Self {
        Self {
            name,
            policy: FailurePolicy::Swallow,
            action: Action::Run(f),
        }
    }

    pub fn nested(
        name: &'static str,
        policy: FailurePolicy,
        operation: &'static str,
        contexts: DeriveFn<S>,
    ) -> Self {
        Self {
            name,
            policy,
            action: Action::Nested {
                operation,
                contexts,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// Failed under `LogAndContinue`; carries the error message.
    Absorbed(String),
    Swallowed,
}

/// What happened to each step that ran, in order.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl PipelineReport {
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(name, _)| *name == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| *o != StepOutcome::Completed)
            .count()
    }
}

pub struct Pipeline<S> {
    operation: &'static str,
    steps: Vec<Step<S>>,
}

impl<S> Pipeline<S> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: Step<S>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name).collect()
    }

    pub fn execute(&self, state: &mut S, runner: &Runner) -> Result<PipelineReport, CoreError> {
        let mut report = PipelineReport::default();
        for step in &self.steps {
            debug!("{}: {}", self.operation, step.name);
            let result = match &step.action {
                Action::Run(f) => f(&mut *state, runner),
                Action::Nested {
                    operation,
                    contexts,
                } => contexts(&*state)
                    .into_iter()
                    .try_for_each(|ctx| runner.run(operation, ctx).map(|_| ())),
            };
            let outcome = match result {
                Ok(()) => StepOutcome::Completed,
                Err(e) => match step.policy {
                    FailurePolicy::Abort => {
                        error!("{}: unable to {}: {e}", self.operation, step.name);
                        return Err(CoreError::Step {
                            operation: self.operation.to_owned(),
                            step: step.name.to_owned(),
                            source: Box::new(e),
                        });
                    }
                    FailurePolicy::LogAndContinue => {
                        warn!("{}: unable to {}: {e}", self.operation, step.name);
                        StepOutcome::Absorbed(e.to_string())
                    }
                    FailurePolicy::Swallow => {
                        trace!("{}: ignoring {} failure: {e}", self.operation, step.name);
                        StepOutcome::Swallowed
                    }
                },
            };
            report.steps.push((step.name, outcome));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;

    #[derive(Default)]
    struct Trace {
        ran: Vec<&'static str>,
    }

    fn ok_a(t: &mut Trace, _: &Runner) -> Result<(), CoreError> {
        t.ran.push("a");
        Ok(())
    }

    fn fail_b(t: &mut Trace, _: &Runner) -> Result<(), CoreError> {
        t.ran.push("b");
        Err(CoreError::validation("test", "b failed"))
    }

    fn ok_c(t: &mut Trace, _: &Runner) -> Result<(), CoreError> {
        t.ran.push("c");
        Ok(())
    }

    #[test]
    fn abort_stops_pipeline() {
        let h = harness();
        let pipeline = Pipeline::new("test")
            .step(Step::abort("a", ok_a))
            .step(Step::abort("b", fail_b))
            .step(Step::abort("c", ok_c));
        let mut trace = Trace::default();
        let err = pipeline.execute(&mut trace, &h.runner).unwrap_err();
        assert_eq!(trace.ran, vec!["a", "b"]);
        assert!(matches!(
            err,
            CoreError::Step { ref step, .. } if step == "b"
        ));
    }

    #[test]
    fn log_and_continue_proceeds() {
        let h = harness();
        let pipeline = Pipeline::new("test")
            .step(Step::abort("a", ok_a))
            .step(Step::log_and_continue("b", fail_b))
            .step(Step::abort("c", ok_c));
        let mut trace = Trace::default();
        let report = pipeline.execute(&mut trace, &h.runner).unwrap();
        assert_eq!(trace.ran, vec!["a", "b", "c"]);
        assert!(matches!(
            report.outcome("b"),
            Some(StepOutcome::Absorbed(msg)) if msg.contains("b failed")
        ));
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn swallow_proceeds_silently() {
        let h = harness();
        let pipeline = Pipeline::new("test")
            .step(Step::swallow("b", fail_b))
            .step(Step::abort("c", ok_c));
        let mut trace = Trace::default();
        let report = pipeline.execute(&mut trace, &h.runner).unwrap();
        assert_eq!(trace.ran, vec!["b", "c"]);
        assert_eq!(report.outcome("b"), Some(&StepOutcome::Swallowed));
        assert_eq!(report.outcome("c"), Some(&StepOutcome::Completed));
    }

    fn two_unknown(_: &Trace) -> Vec<Context> {
        vec![Context::new("sim"), Context::new("sim")]
    }

    fn none(_: &Trace) -> Vec<Context> {
        Vec::new()
    }

    #[test]
    fn nested_failure_follows_step_policy() {
        let h = harness();
        let pipeline = Pipeline::new("outer")
            .step(Step::nested(
                "inner",
                FailurePolicy::Abort,
                "no_such_operation",
                two_unknown,
            ))
            .step(Step::abort("c", ok_c));
        let mut trace = Trace::default();
        let err = pipeline.execute(&mut trace, &h.runner).unwrap_err();
        assert!(trace.ran.is_empty());
        assert!(matches!(err.root_cause(), CoreError::UnknownOperation(_)));
    }

    #[test]
    fn nested_with_no_contexts_completes() {
        let h = harness();
        let pipeline = Pipeline::new("outer")
            .step(Step::nested(
                "inner",
                FailurePolicy::Abort,
                "no_such_operation",
                none,
            ))
            .step(Step::abort("c", ok_c));
        let mut trace = Trace::default();
        let report = pipeline.execute(&mut trace, &h.runner).unwrap();
        assert_eq!(report.outcome("inner"), Some(&StepOutcome::Completed));
        assert_eq!(trace.ran, vec!["c"]);
    }

    #[test]
    fn step_names_in_order() {
        let pipeline: Pipeline<Trace> = Pipeline::new("test")
            .step(Step::abort("a", ok_a))
            .step(Step::swallow("b", fail_b));
        assert_eq!(pipeline.step_names(), vec!["a", "b"]);
    }
}
