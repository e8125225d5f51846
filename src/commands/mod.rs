//! CLI command definitions and dispatch.

pub mod plugins;
pub mod serve;

use clap::{Parser, Subcommand};

use trees_core::config::AppConfig;
use trees_core::error::AppError;

use crate::output::OutputFormat;

/// Trees — plugin-extensible web application runtime
#[derive(Debug, Parser)]
#[command(name = "trees", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (extension optional)
    #[arg(short, long, default_value = "config/default")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(serve::ServeArgs),
    /// Plugin management
    Plugins(plugins::PluginArgs),
}

impl Commands {
    /// Whether this command runs the server.
    pub fn is_serve(&self) -> bool {
        matches!(self, Self::Serve(_))
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Serve(args) => serve::execute(args, config).await,
            Commands::Plugins(args) => plugins::execute(args, config, self.format),
        }
    }
}
