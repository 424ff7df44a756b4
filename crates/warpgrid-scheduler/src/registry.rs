//! Plugin registry — named factories for building plugin instances.
//!
//! The framework asks the registry for each plugin named in the profile
//! and builds every one exactly once, so a plugin configured at several
//! extension points is the same instance at each of them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SchedulerError, SchedulerResult};
use crate::plugin::{Handle, Plugin};

/// Builds a plugin from its optional `plugin_args` table.
pub type PluginFactory =
    Box<dyn Fn(Option<&toml::Value>, &Handle) -> anyhow::Result<Arc<dyn Plugin>> + Send + Sync>;

/// Name → factory map.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, PluginFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in plugins registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::plugins::register_builtins(&mut registry);
        registry
    }

    /// Register a factory under `name`.
    pub fn register(&mut self, name: &str, factory: PluginFactory) -> SchedulerResult<()> {
        if self.factories.contains_key(name) {
            return Err(SchedulerError::DuplicatePlugin(name.to_string()));
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Registered plugin names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a fresh instance of `name`.
    pub fn instantiate(
        &self,
        name: &str,
        args: Option<&toml::Value>,
        handle: &Handle,
    ) -> SchedulerResult<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownPlugin(name.to_string()))?;

        factory(args, handle).map_err(|e| SchedulerError::PluginInit {
            name: name.to_string(),
            message: format!("{e:#}"),
        })
    }
}
