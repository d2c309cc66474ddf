//! `evar_add` and `evar_remove`: edit the application's environment-variable
//! table. The table is always read whole, edited and written whole.

use super::split_list;
use crate::context::Context;
use crate::pipeline::{Pipeline, Step};
use crate::runner::{Operation, Runner};
use crate::toolkit::Toolkit;
use crate::CoreError;
use stevedore_schema::validate_evar_key;
use stevedore_store::{meta_bucket, Evars, EVARS_KEY};
use tracing::debug;

pub const ADD: &str = "evar_add";
pub const REMOVE: &str = "evar_remove";

fn parse_pairs(value: &str) -> Result<Vec<(String, String)>, CoreError> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| -> Result<(String, String), CoreError> {
            let (key, val) = line.split_once('=').ok_or_else(|| {
                CoreError::validation(ADD, format!("expected KEY=VALUE, got '{line}'"))
            })?;
            let key = key.trim();
            validate_evar_key(key).map_err(|e| CoreError::validation(ADD, e.to_string()))?;
            Ok((key.to_owned(), val.to_owned()))
        })
        .collect()
}

enum Edit {
    Set(Vec<(String, String)>),
    Unset(Vec<String>),
}

struct EvarEdit {
    operation: &'static str,
    control: Context,
    edit: Edit,
    bucket: String,
    evars: Evars,
}

pub fn construct_add(toolkit: &Toolkit, control: Context) -> Result<Box<dyn Operation>, CoreError> {
    let pairs = parse_pairs(control.require(ADD, "evars")?)?;
    Ok(Box::new(EvarEdit {
        operation: ADD,
        bucket: meta_bucket(&toolkit.app_id),
        control,
        edit: Edit::Set(pairs),
        evars: Evars::new(),
    }))
}

pub fn construct_remove(
    toolkit: &Toolkit,
    control: Context,
) -> Result<Box<dyn Operation>, CoreError> {
    let keys: Vec<String> = split_list(control.require(REMOVE, "keys")?)
        .map(str::to_owned)
        .collect();
    Ok(Box::new(EvarEdit {
        operation: REMOVE,
        bucket: meta_bucket(&toolkit.app_id),
        control,
        edit: Edit::Unset(keys),
        evars: Evars::new(),
    }))
}

fn pipeline(operation: &'static str) -> Pipeline<EvarEdit> {
    Pipeline::new(operation)
        .step(Step::abort("load-evars", EvarEdit::load))
        .step(Step::abort("apply", EvarEdit::apply))
        .step(Step::abort("save-evars", EvarEdit::save))
}

impl Operation for EvarEdit {
    fn process(&mut self, runner: &Runner) -> Result<(), CoreError> {
        pipeline(self.operation).execute(self, runner)?;
        Ok(())
    }

    fn results(self: Box<Self>) -> Context {
        self.control
    }
}

impl EvarEdit {
    fn load(&mut self, runner: &Runner) -> Result<(), CoreError> {
        self.evars = runner
            .toolkit()
            .store
            .get_or_default(&self.bucket, EVARS_KEY)?;
        Ok(())
    }

    fn apply(&mut self, _runner: &Runner) -> Result<(), CoreError> {
        match &self.edit {
            Edit::Set(pairs) => {
                for (key, value) in pairs {
                    self.evars.set(key.as_str(), value.as_str());
                    self.control.display.append(format!("Setting {key}"));
                }
            }
            Edit::Unset(keys) => {
                for key in keys {
                    if self.evars.remove(key) {
                        self.control.display.append(format!("Removing {key}"));
                    } else {
                        debug!("{key} is not set");
                    }
                }
            }
        }
        Ok(())
    }

    fn save(&mut self, runner: &Runner) -> Result<(), CoreError> {
        runner
            .toolkit()
            .store
            .put(&self.bucket, EVARS_KEY, &self.evars)?;
        self.control.set("count", self.evars.len().to_string());
        Ok(())
    }
}
