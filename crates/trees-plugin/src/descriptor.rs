//! Plugin descriptor — the `plugin.json` shipped in every plugin directory.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use trees_core::error::{AppError, ErrorKind};
use trees_core::result::AppResult;

/// File name of the descriptor inside a plugin directory.
pub const DESCRIPTOR_FILE: &str = "plugin.json";

/// Declared metadata of a plugin.
///
/// `id` and `name` are required; everything else has a default. The
/// descriptor is validated once at discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique, stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Whether the plugin is enabled when no persisted state exists for it.
    #[serde(default)]
    pub enabled: bool,
    /// Plugins that must be active before this one boots.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Runtime and capability constraints.
    #[serde(default)]
    pub requires: Requirements,
    /// Default settings exposed to the plugin.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Host constraints declared by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    /// Version constraint on the runtime, e.g. `">=0.1, <1.0"`.
    #[serde(default, alias = "runtime_version", skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    /// Capabilities the host must provide.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl PluginDescriptor {
    /// Parses and validates a descriptor from JSON text.
    pub fn from_json(text: &str) -> AppResult<Self> {
        let descriptor: Self = serde_json::from_str(text).map_err(|e| {
            AppError::with_source(
                ErrorKind::Descriptor,
                format!("Malformed descriptor: {e}"),
                e,
            )
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reads and validates the descriptor inside `plugin_dir`.
    pub fn load(plugin_dir: &Path) -> AppResult<Self> {
        let path = plugin_dir.join(DESCRIPTOR_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            AppError::with_source(
                ErrorKind::Descriptor,
                format!("Cannot read descriptor '{}': {e}", path.display()),
                e,
            )
        })?;
        Self::from_json(&text)
    }

    /// Checks required fields and identifier shape.
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::descriptor("Descriptor is missing 'id'"));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::descriptor(format!(
                "Descriptor for '{}' is missing 'name'",
                self.id
            )));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AppError::descriptor(format!(
                "Plugin id '{}' may only contain ASCII letters, digits, '-', '_' and '.'",
                self.id
            )));
        }
        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(AppError::descriptor(format!(
                "Plugin '{}' lists itself as a dependency",
                self.id
            )));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "0.0.0".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_descriptor_gets_defaults() {
        let descriptor = PluginDescriptor::from_json(r#"{"id": "blog", "name": "Blog"}"#).unwrap();
        assert_eq!(descriptor.version, "0.0.0");
        assert!(!descriptor.enabled);
        assert!(descriptor.dependencies.is_empty());
        assert_eq!(descriptor.requires, Requirements::default());
        assert!(descriptor.settings.is_empty());
    }

    #[test]
    fn test_full_descriptor() {
        let descriptor = PluginDescriptor::from_json(
            r#"{
                "id": "admin",
                "name": "Admin",
                "version": "1.2.0",
                "enabled": true,
                "dependencies": ["users"],
                "requires": {"runtimeVersion": ">=0.1", "capabilities": ["sessions"]},
                "settings": {"nav_label": "Admin"}
            }"#,
        )
        .unwrap();

        assert!(descriptor.enabled);
        assert_eq!(descriptor.dependencies, vec!["users"]);
        assert_eq!(descriptor.requires.runtime_version.as_deref(), Some(">=0.1"));
        assert_eq!(descriptor.requires.capabilities, vec!["sessions"]);
        assert_eq!(descriptor.settings["nav_label"], "Admin");
    }

    #[test]
    fn test_missing_required_fields_are_rejected() {
        let missing_id = PluginDescriptor::from_json(r#"{"name": "Blog"}"#).unwrap_err();
        assert!(missing_id.is(ErrorKind::Descriptor));

        let missing_name = PluginDescriptor::from_json(r#"{"id": "blog"}"#).unwrap_err();
        assert!(missing_name.is(ErrorKind::Descriptor));

        let empty_name = PluginDescriptor::from_json(r#"{"id": "blog", "name": " "}"#).unwrap_err();
        assert!(empty_name.is(ErrorKind::Descriptor));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = PluginDescriptor::from_json("{not json").unwrap_err();
        assert!(err.is(ErrorKind::Descriptor));
    }

    #[test]
    fn test_invalid_id_and_self_dependency() {
        assert!(PluginDescriptor::from_json(r#"{"id": "a/b", "name": "x"}"#).is_err());
        assert!(
            PluginDescriptor::from_json(r#"{"id": "a", "name": "x", "dependencies": ["a"]}"#)
                .is_err()
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PluginDescriptor::load(dir.path()).unwrap_err();
        assert!(err.is(ErrorKind::Descriptor));
    }
}
