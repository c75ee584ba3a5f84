use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use wyvern_core::error::{Result, WyvernError};
use wyvern_core::traits::Action;

/// Builds an empty action, to be hydrated by `Action::from_config`.
pub type ActionFactory = Arc<dyn Fn() -> Box<dyn Action> + Send + Sync>;

/// Registry of action factories keyed by plugin name.
#[derive(Clone)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory. A later registration under the same name wins.
    pub fn register<F>(&mut self, plugin: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Action> + Send + Sync + 'static,
    {
        self.factories.insert(plugin.into(), Arc::new(factory));
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.factories.contains_key(plugin)
    }

    /// List registered plugin names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate and hydrate an action.
    pub fn make(&self, plugin: &str, config: &serde_json::Value) -> Result<Box<dyn Action>> {
        let factory = self
            .factories
            .get(plugin)
            .ok_or_else(|| WyvernError::PluginNotFound(plugin.to_string()))?;

        let mut action = factory();
        action.from_config(config)?;
        debug!(plugin, "Action instantiated");
        Ok(action)
    }

    /// Create a registry with all built-in actions registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::print::PLUGIN, || {
            Box::new(crate::builtin::print::PrintAction::default())
        });
        registry.register(crate::builtin::command::PLUGIN, || {
            Box::new(crate::builtin::command::CommandAction::default())
        });
        registry
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
