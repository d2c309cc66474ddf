use crate::CoreError;
use console::Style;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Append-only sink for user-facing progress messages.
///
/// Clones share the same buffer, so messages from nested operations land in
/// the caller's display.
#[derive(Debug, Clone, Default)]
pub struct Display {
    lines: Arc<Mutex<Vec<String>>>,
    echo: bool,
}

impl Display {
    pub fn new() -> Self {
        Self::default()
    }

    /// A display that also prints every message to stderr as a bullet.
    pub fn echoing() -> Self {
        Self {
            lines: Arc::default(),
            echo: true,
        }
    }

    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        if self.echo {
            eprintln!("{} {message}", Style::new().cyan().bold().apply_to("+>"));
        }
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Parameters and results threaded through one operation invocation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub meta: BTreeMap<String, String>,
    pub env: String,
    pub display: Display,
}

impl Context {
    pub fn new(env: impl Into<String>) -> Self {
        Self {
            meta: BTreeMap::new(),
            env: env.into(),
            display: Display::new(),
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: Display) -> Self {
        self.display = display;
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.meta.insert(key.to_owned(), value.into());
    }

    /// The value under `key`, or a `Validation` error when it is missing or
    /// empty.
    pub fn require(&self, operation: &str, key: &str) -> Result<&str, CoreError> {
        match self.get(key) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(CoreError::validation(
                operation,
                format!("missing required parameter '{key}'"),
            )),
        }
    }

    /// Fill `key` with `default()` when it is missing or empty, then return it.
    pub fn get_or_insert_with(&mut self, key: &str, default: impl FnOnce() -> String) -> &str {
        let entry = self.meta.entry(key.to_owned()).or_default();
        if entry.is_empty() {
            *entry = default();
        }
        entry
    }

    /// Fresh context for a nested invocation: same env tag and display,
    /// empty parameters.
    pub fn derive(&self) -> Context {
        Context {
            meta: BTreeMap::new(),
            env: self.env.clone(),
            display: self.display.clone(),
        }
    }
}
