use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::debug;

use crate::value::{Function, Value};

/// Names an expression may refer to, and what they are bound to.
///
/// An environment is never modified by evaluation. Layers are composed with
/// [`Environment::with_parent`]: lookups try the child first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: Arc<Environment>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.define(name, value);
        self
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.define(name, Value::Callable(Function::new(f)));
        self
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        match self.bindings.get(name) {
            Some(value) => Some(value),
            None => self.parent.as_ref()?.lookup(name),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Environment {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            bindings: map
                .into_iter()
                .map(|(name, value)| (name, Value::from(value)))
                .collect(),
            parent: None,
        }
    }
}

/// Process-wide bindings every evaluation sees beneath its own environment.
///
/// Registration swaps in a new `Arc`, so an evaluation holding a snapshot
/// keeps a consistent view. Register at startup, before evaluating.
static REGISTRY: LazyLock<RwLock<Arc<Environment>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Environment::new())));

fn update_registry(f: impl FnOnce(&mut Environment)) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    f(Arc::make_mut(&mut *registry));
}

/// Registers a function for all evaluations. Last registration wins.
pub fn register_function<F>(name: impl Into<String>, f: F)
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
{
    let name = name.into();
    debug!(%name, "registering function");
    update_registry(|env| env.define(name, Value::Callable(Function::new(f))));
}

/// Registers a constant for all evaluations. Last registration wins.
pub fn register_constant(name: impl Into<String>, value: impl Into<Value>) {
    let name = name.into();
    debug!(%name, "registering constant");
    update_registry(|env| env.define(name, value));
}

pub fn unregister(name: &str) -> Option<Value> {
    let mut removed = None;
    update_registry(|env| removed = env.remove(name));
    removed
}

/// The registry as it is right now.
pub fn registry_snapshot() -> Arc<Environment> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
