//! Persisted plugin activation state.
//!
//! The store is a single JSON document holding each plugin's enabled flag
//! and its settings overrides. Two older shapes are also read: a list of
//! active ids (`{"active_plugins": [...]}`), where every plugin not listed
//! is inactive, and a flat map of flags (`{"blog": true}`). Any other
//! shape is an error rather than an empty state. Writes go to a temporary file in the same
//! directory which is then renamed over the target, so concurrent readers
//! in other processes see either the old or the new document, never a
//! partial one. Concurrent writers race last-write-wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use trees_core::error::{AppError, ErrorKind};
use trees_core::result::AppResult;

/// Persisted state of one plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginStateEntry {
    /// Whether the plugin is enabled.
    pub enabled: bool,
    /// Settings overriding the descriptor defaults.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginState {
    /// Plugin id → state.
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginStateEntry>,
    /// Plugins without an entry are disabled instead of falling back to
    /// their descriptor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exhaustive: bool,
    /// Time of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `{"active_plugins": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActiveList {
    /// Ids of active plugins.
    active_plugins: Vec<String>,
}

/// Every document shape `load` accepts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredState {
    /// Current shape.
    Current(PluginState),
    /// List of active ids.
    ActiveList(ActiveList),
    /// Plugin id → enabled flag.
    Flags(BTreeMap<String, bool>),
}

impl From<StoredState> for PluginState {
    fn from(stored: StoredState) -> Self {
        let entry = |enabled| PluginStateEntry {
            enabled,
            settings: Map::new(),
        };
        match stored {
            StoredState::Current(state) => state,
            StoredState::ActiveList(list) => Self {
                plugins: list
                    .active_plugins
                    .into_iter()
                    .map(|id| (id, entry(true)))
                    .collect(),
                exhaustive: true,
                updated_at: None,
            },
            StoredState::Flags(flags) => Self {
                plugins: flags
                    .into_iter()
                    .map(|(id, enabled)| (id, entry(enabled)))
                    .collect(),
                ..Self::default()
            },
        }
    }
}

impl PluginState {
    /// Returns the persisted enabled flag, if the document decides it.
    pub fn enabled(&self, id: &str) -> Option<bool> {
        match self.plugins.get(id) {
            Some(entry) => Some(entry.enabled),
            None => self.exhaustive.then_some(false),
        }
    }

    /// Returns the persisted settings overrides for `id`.
    pub fn settings(&self, id: &str) -> Option<&Map<String, Value>> {
        self.plugins.get(id).map(|entry| &entry.settings)
    }

    /// Returns a copy with `id`'s enabled flag set.
    pub fn with_enabled(&self, id: &str, enabled: bool) -> Self {
        let mut next = self.clone();
        next.plugins.entry(id.to_string()).or_default().enabled = enabled;
        next
    }

    /// Returns a copy with `id`'s settings overrides replaced, keeping
    /// `enabled` as given for plugins without an entry yet.
    pub fn with_settings(&self, id: &str, enabled: bool, settings: Map<String, Value>) -> Self {
        let mut next = self.clone();
        let entry = next
            .plugins
            .entry(id.to_string())
            .or_insert_with(|| PluginStateEntry {
                enabled,
                settings: Map::new(),
            });
        entry.settings = settings;
        next
    }

    /// Ids of enabled plugins, sorted.
    pub fn enabled_ids(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// File-backed store for [`PluginState`].
#[derive(Debug, Clone)]
pub struct PluginStateStore {
    /// Path of the JSON document.
    path: PathBuf,
}

impl PluginStateStore {
    /// Creates a store backed by `path`. Nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A missing file is an empty state.
    pub fn load(&self) -> AppResult<PluginState> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No plugin state file, starting empty");
                return Ok(PluginState::default());
            }
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Cannot read plugin state '{}': {e}", self.path.display()),
                    e,
                ));
            }
        };

        let value: Value = serde_json::from_str(&text).map_err(|e| {
            AppError::with_source(
                ErrorKind::Serialization,
                format!("Corrupt plugin state '{}': {e}", self.path.display()),
                e,
            )
        })?;

        let stored: StoredState = serde_json::from_value(value).map_err(|e| {
            AppError::with_source(
                ErrorKind::Serialization,
                format!(
                    "Unrecognized plugin state '{}': expected {{\"plugins\": {{..}}}}, \
                     {{\"active_plugins\": [..]}} or {{\"<id>\": true|false}}",
                    self.path.display()
                ),
                e,
            )
        })?;

        Ok(stored.into())
    }

    /// Atomically replaces the document with `state`.
    pub fn save(&self, state: &PluginState) -> AppResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut stamped = state.clone();
        stamped.updated_at = Some(Utc::now());
        let body = serde_json::to_vec_pretty(&stamped)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&body)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Cannot replace plugin state '{}': {}", self.path.display(), e.error),
                e.error,
            )
        })?;

        info!(
            path = %self.path.display(),
            enabled = ?state.enabled_ids(),
            "Plugin state saved"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginStateStore::new(dir.path().join("plugins.json"));
        assert_eq!(store.load().unwrap().plugins.len(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PluginStateStore::new(dir.path().join("nested/plugins.json"));

        let state = PluginState::default()
            .with_enabled("p1", true)
            .with_enabled("p2", false);
        store.save(&state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.enabled("p1"), Some(true));
        assert_eq!(loaded.enabled("p2"), Some(false));
        assert_eq!(loaded.enabled("p3"), None);
        assert!(loaded.updated_at.is_some());
        assert_eq!(loaded.enabled_ids(), vec!["p1"]);
    }

    #[test]
    fn test_settings_survive_enable_toggle() {
        let mut settings = Map::new();
        settings.insert("nav_label".into(), json!("Control"));

        let state = PluginState::default()
            .with_settings("admin", false, settings)
            .with_enabled("admin", true);

        assert_eq!(state.enabled("admin"), Some(true));
        assert_eq!(state.settings("admin").unwrap()["nav_label"], "Control");
    }

    fn load_text(text: &str) -> AppResult<PluginState> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        std::fs::write(&path, text).unwrap();
        PluginStateStore::new(&path).load()
    }

    #[test]
    fn test_active_list_disables_unlisted_plugins() {
        let loaded = load_text(r#"{"active_plugins": ["blog", "admin"]}"#).unwrap();
        assert_eq!(loaded.enabled_ids(), vec!["admin", "blog"]);
        assert_eq!(loaded.enabled("shop"), Some(false));
    }

    #[test]
    fn test_active_list_stays_exhaustive_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        std::fs::write(&path, r#"{"active_plugins": ["blog"]}"#).unwrap();
        let store = PluginStateStore::new(&path);

        let state = store.load().unwrap().with_enabled("admin", true);
        store.save(&state).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.enabled_ids(), vec!["admin", "blog"]);
        assert_eq!(reloaded.enabled("shop"), Some(false));
    }

    #[test]
    fn test_flat_flag_map_is_read() {
        let loaded = load_text(r#"{"p1": true, "p2": false}"#).unwrap();
        assert_eq!(loaded.enabled("p1"), Some(true));
        assert_eq!(loaded.enabled("p2"), Some(false));
        assert_eq!(loaded.enabled("p3"), None);
    }

    #[test]
    fn test_current_shape_leaves_unknown_plugins_undecided() {
        let loaded =
            load_text(r#"{"plugins": {"blog": {"enabled": true, "settings": {"title": "Notes"}}}}"#)
                .unwrap();
        assert_eq!(loaded.enabled("blog"), Some(true));
        assert_eq!(loaded.settings("blog").unwrap()["title"], "Notes");
        assert_eq!(loaded.enabled("shop"), None);
        assert_eq!(load_text("{}").unwrap(), PluginState::default());
    }

    #[test]
    fn test_unrecognized_shapes_are_errors() {
        for text in [
            r#"{"plugin": {"blog": {"enabled": true}}}"#,
            r#"{"plugins": {}, "active": ["blog"]}"#,
            r#"{"active_plugins": "blog"}"#,
            r#"["blog"]"#,
        ] {
            let err = load_text(text).unwrap_err();
            assert!(err.is(ErrorKind::Serialization), "{text} should be rejected");
        }
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugins.json");
        std::fs::write(&path, "{\"plugins\": ").unwrap();

        let err = PluginStateStore::new(&path).load().unwrap_err();
        assert!(err.is(ErrorKind::Serialization));
    }

    #[test]
    fn test_save_into_unwritable_location_fails_without_touching_previous() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let store = PluginStateStore::new(blocker.join("plugins.json"));
        let state = PluginState::default().with_enabled("p1", true);
        assert!(store.save(&state).is_err());
        assert_eq!(std::fs::read_to_string(&blocker).unwrap(), "file");
    }
}
