//! Start the Trees server.

use std::sync::Arc;

use clap::Args;

use trees_app::Trees;
use trees_app::plugins::builtin_catalog;
use trees_core::config::AppConfig;
use trees_core::error::AppError;

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the server host
    #[arg(long)]
    pub host: Option<String>,
}

/// Execute the serve command
pub async fn execute(args: &ServeArgs, mut config: AppConfig) -> Result<(), AppError> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Trees");

    let server_config = config.server.clone();
    let trees = Trees::new(config, builtin_catalog())?;
    trees.run()?;

    {
        let manager = trees.plugin_manager();
        for (plugin_id, reason) in manager.boot_errors() {
            tracing::warn!(plugin_id = %plugin_id, reason = %reason, "Plugin not booted");
        }
    }

    trees_app::server::serve(Arc::new(trees), &server_config).await
}
