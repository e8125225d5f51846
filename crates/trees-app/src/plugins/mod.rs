//! Plugins compiled into the binary.
//!
//! A plugin is installed by dropping its directory (with `plugin.json`)
//! into the plugin directory; the implementation is looked up here by id.

pub mod admin;
pub mod blog;

use trees_plugin::PluginCatalog;

/// Catalog of every bundled plugin implementation.
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog
        .register(admin::PLUGIN_ID, admin::AdminPlugin::factory)
        .register(blog::PLUGIN_ID, blog::BlogPlugin::factory);
    catalog
}
