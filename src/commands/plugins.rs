//! Plugin management CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use tabled::Tabled;

use trees_app::Trees;
use trees_app::plugins::builtin_catalog;
use trees_core::config::AppConfig;
use trees_core::error::AppError;

use crate::output::{self, OutputFormat};

/// Arguments for plugin commands
#[derive(Debug, Args)]
pub struct PluginArgs {
    /// Plugin subcommand
    #[command(subcommand)]
    pub command: PluginCommand,
}

/// Plugin subcommands
#[derive(Debug, Subcommand)]
pub enum PluginCommand {
    /// List discovered plugins
    List,
    /// Check whether a plugin can be activated
    Check {
        /// Plugin id
        id: String,
    },
    /// Activate a plugin
    Activate {
        /// Plugin id
        id: String,
    },
    /// Deactivate a plugin
    Deactivate {
        /// Plugin id
        id: String,
    },
    /// Show or change a plugin's settings
    Settings {
        /// Plugin id
        id: String,
        /// Setting to change, as `key=value` (value parsed as JSON, else text;
        /// `key=null` restores the default)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
}

/// Plugin display row for table output
#[derive(Debug, Serialize, Tabled)]
struct PluginRow {
    /// Plugin id
    id: String,
    /// Display name
    name: String,
    /// Version
    version: String,
    /// Enabled flag
    enabled: bool,
    /// Booted in this process
    booted: bool,
    /// Declared dependencies
    dependencies: String,
    /// Boot error, if any
    status: String,
}

/// Execute plugin commands
pub fn execute(args: &PluginArgs, config: AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let trees = Trees::new(config, builtin_catalog())?;
    trees.run()?;
    let mut manager = trees.plugin_manager();

    match &args.command {
        PluginCommand::List => {
            let rows: Vec<PluginRow> = manager
                .all_plugins()
                .into_iter()
                .map(|p| PluginRow {
                    status: manager
                        .boot_errors()
                        .get(&p.id)
                        .cloned()
                        .unwrap_or_else(|| "ok".to_string()),
                    dependencies: p.dependencies.join(", "),
                    id: p.id,
                    name: p.name,
                    version: p.version,
                    enabled: p.enabled,
                    booted: p.booted,
                })
                .collect();

            output::print_list(&rows, format);

            if format == OutputFormat::Table {
                output::print_kv("State file", &manager.state_path().display().to_string());
                for rejection in manager.rejections() {
                    output::print_warning(&format!(
                        "Skipped {}: {}",
                        rejection.path.display(),
                        rejection.reason
                    ));
                }
            }
        }
        PluginCommand::Check { id } => {
            let report = manager.check_requirements(id)?;
            match format {
                OutputFormat::Json => output::print_json(&report),
                OutputFormat::Table => {
                    output::print_kv("Plugin", id);
                    output::print_kv("Can activate", if report.valid { "yes" } else { "no" });
                    for error in &report.errors {
                        output::print_warning(error);
                    }
                }
            }
        }
        PluginCommand::Activate { id } => {
            manager.try_activate(id)?;
            output::print_success(&format!("Plugin '{}' activated", id));
        }
        PluginCommand::Deactivate { id } => {
            manager.try_deactivate(id)?;
            output::print_success(&format!("Plugin '{}' deactivated", id));
        }
        PluginCommand::Settings { id, set } => {
            let settings = if set.is_empty() {
                manager.plugin_config(id)?.settings
            } else {
                let changes = parse_assignments(set)?;
                let settings = manager.update_settings(id, changes)?;
                output::print_success(&format!("Settings of '{}' updated", id));
                settings
            };
            output::print_json(&settings);
        }
    }

    Ok(())
}

/// Parses `key=value` pairs; values are JSON when they parse as JSON.
fn parse_assignments(pairs: &[String]) -> Result<Map<String, Value>, AppError> {
    let mut changes = Map::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            AppError::validation(format!("Expected KEY=VALUE, got '{}'", pair))
        })?;
        if key.trim().is_empty() {
            return Err(AppError::validation(format!("Empty key in '{}'", pair)));
        }
        let value =
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        changes.insert(key.trim().to_string(), value);
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let changes = parse_assignments(&[
            "per_page=20".to_string(),
            "title=Field Notes".to_string(),
            "nav_label=null".to_string(),
        ])
        .unwrap();

        assert_eq!(changes["per_page"], 20);
        assert_eq!(changes["title"], "Field Notes");
        assert!(changes["nav_label"].is_null());
    }

    #[test]
    fn test_parse_assignments_rejects_malformed_pairs() {
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=1".to_string()]).is_err());
    }
}
