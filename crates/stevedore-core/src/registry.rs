use crate::context::Context;
use crate::runner::Operation;
use crate::toolkit::Toolkit;
use crate::CoreError;
use std::collections::BTreeMap;

/// Validates a context and builds the unit that will execute it. Must not
/// touch any collaborator.
pub type Constructor = fn(&Toolkit, Context) -> Result<Box<dyn Operation>, CoreError>;

/// Collects constructors before the registry is frozen. Names are unique.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, Constructor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &str, constructor: Constructor) -> Result<Self, CoreError> {
        if self.entries.contains_key(name) {
            return Err(CoreError::DuplicateOperation(name.to_owned()));
        }
        self.entries.insert(name.to_owned(), constructor);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

/// Operation name to constructor table, built once at start-up.
pub struct Registry {
    entries: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding every built-in operation.
    pub fn builtin() -> Result<Self, CoreError> {
        Ok(crate::operations::register_builtin(Self::builder())?.build())
    }

    pub fn lookup(&self, name: &str) -> Result<Constructor, CoreError> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownOperation(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}
