//! Plugin runtime configuration.

use serde::{Deserialize, Serialize};

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Directory scanned for plugin packages (one sub-directory per plugin).
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// JSON document holding the persisted enabled flags and settings overrides.
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Runtime version advertised to plugin `requires.runtime` constraints.
    #[serde(default = "default_runtime_version")]
    pub runtime_version: String,
    /// Capabilities the host provides to plugin `requires.capabilities` lists.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Whether enabled plugins are booted on startup.
    #[serde(default = "default_true")]
    pub auto_boot: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            state_file: default_state_file(),
            runtime_version: default_runtime_version(),
            capabilities: Vec::new(),
            auto_boot: true,
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_state_file() -> String {
    "./storage/plugins.json".to_string()
}

fn default_runtime_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}
