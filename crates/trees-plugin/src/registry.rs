//! Plugin contract and the registry of discovered plugins.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};

use trees_core::result::AppResult;
use trees_core::traits::ViewRenderer;

use crate::api::context::{PluginContext, RoutesEntry};
use crate::descriptor::PluginDescriptor;

/// Trait that all plugins must implement.
///
/// Every lifecycle call receives an explicit [`PluginContext`]; plugins
/// never reach for global state to find the router or hook manager.
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Stable identifier; must equal the descriptor's `id`.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Display version.
    fn version(&self) -> &str;

    /// Directory the plugin was discovered in.
    fn base_path(&self) -> &Path;

    /// Route registration entry point, if the plugin serves routes.
    fn routes_entry(&self) -> Option<RoutesEntry> {
        None
    }

    /// Registers services. Routes and views do not exist yet.
    fn register(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Final initialization; runs after routes are registered.
    fn boot(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called once when an operator activates the plugin.
    fn on_activate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Called once when an operator deactivates the plugin.
    fn on_deactivate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }
}

/// A discovered plugin and its lifecycle state.
#[derive(Debug, Clone)]
pub struct RegisteredPlugin {
    /// Validated descriptor.
    pub descriptor: PluginDescriptor,
    /// The implementation.
    pub instance: Arc<dyn Plugin>,
    /// Persisted enabled flag.
    pub enabled: bool,
    /// Whether services, routes and hooks are currently installed.
    pub booted: bool,
    /// Settings overrides loaded from the state store.
    pub overrides: Map<String, Value>,
    /// View collaborator created at boot, if the plugin ships views.
    pub view: Option<Arc<dyn ViewRenderer>>,
}

impl RegisteredPlugin {
    /// Descriptor defaults overlaid with persisted overrides.
    pub fn effective_settings(&self) -> Map<String, Value> {
        let mut settings = self.descriptor.settings.clone();
        for (key, value) in &self.overrides {
            settings.insert(key.clone(), value.clone());
        }
        settings
    }
}

/// Registry of discovered plugins, in discovery order.
///
/// Entries are only ever added; undiscovering a plugin requires a restart.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    /// Plugin id → entry.
    plugins: HashMap<String, RegisteredPlugin>,
    /// Ids in discovery order.
    order: Vec<String>,
}

impl PluginRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin. Returns `false` if the id is already registered.
    pub fn insert(&mut self, plugin: RegisteredPlugin) -> bool {
        let id = plugin.descriptor.id.clone();
        if self.plugins.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.plugins.insert(id, plugin);
        true
    }

    /// Gets a plugin by id.
    pub fn get(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.plugins.get(id)
    }

    /// Gets a plugin by id for mutation.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut RegisteredPlugin> {
        self.plugins.get_mut(id)
    }

    /// Ids in discovery order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Plugins in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> {
        self.order.iter().filter_map(|id| self.plugins.get(id))
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing has been discovered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
