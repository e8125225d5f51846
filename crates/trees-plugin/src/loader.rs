//! Plugin catalog — constructors for plugin implementations keyed by id.
//!
//! Implementations are compiled into the host. Discovery pairs each
//! `plugin.json` found on disk with the factory registered under the same
//! id; a descriptor without a factory is rejected.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use trees_core::result::AppResult;

use crate::descriptor::PluginDescriptor;
use crate::registry::Plugin;

/// Builds a plugin instance from its descriptor and directory.
pub type PluginFactory =
    Arc<dyn Fn(&PluginDescriptor, &Path) -> AppResult<Arc<dyn Plugin>> + Send + Sync>;

/// Registry of plugin constructors.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    /// Plugin id → factory.
    factories: BTreeMap<String, PluginFactory>,
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("ids", &self.ids())
            .finish()
    }
}

impl PluginCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor for plugin `id`, replacing any previous one.
    pub fn register<F>(&mut self, id: &str, factory: F) -> &mut Self
    where
        F: Fn(&PluginDescriptor, &Path) -> AppResult<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
        self
    }

    /// Looks up the constructor for `id`.
    pub fn get(&self, id: &str) -> Option<&PluginFactory> {
        self.factories.get(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
