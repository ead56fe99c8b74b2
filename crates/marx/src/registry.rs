//! Name to callable lookup for late-bound steps.

use crate::step::{Step, StepBuilder};
use marx_core::{Callable, WorkflowError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callables registered by name, populated once at startup.
///
/// # Examples
///
/// ```
/// use marx::{FnCallable, Kwargs, Registry, Value};
///
/// let mut registry = Registry::new();
/// registry.register("pies.bake", FnCallable::new("bake", |_kwargs: Kwargs| {
///     Ok(Value::from("lemon"))
/// }));
///
/// let step = registry.step("pies.bake").expect("registered").build();
/// assert_eq!(step.name(), "pies.bake");
/// assert!(registry.step("pies.eat").is_err());
/// ```
#[derive(Default, Clone)]
pub struct Registry {
    callables: HashMap<String, Arc<dyn Callable>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("callables", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callable, replacing any earlier entry under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        callable: impl Callable + 'static,
    ) -> &mut Self {
        self.register_shared(name, Arc::new(callable))
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        callable: Arc<dyn Callable>,
    ) -> &mut Self {
        self.callables.insert(name.into(), callable);
        self
    }

    /// Looks up a callable by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Callable>, WorkflowError> {
        self.callables
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }

    /// Starts a step for the callable registered under `name`. The step is
    /// named after the registry entry.
    pub fn step(&self, name: &str) -> Result<StepBuilder, WorkflowError> {
        Ok(Step::shared(self.resolve(name)?).name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.callables.keys().map(String::as_str)
    }
}
