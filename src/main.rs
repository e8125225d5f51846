//! Trees — plugin-extensible web application runtime.
//!
//! Entry point: parses the command line, loads configuration, installs
//! logging and dispatches to the selected command.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use trees_core::config::AppConfig;

mod commands;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config, cli.command.is_serve());

    if let Err(e) = cli.execute(config).await {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over the configured level. Administrative commands log
/// at `warn` unless overridden so their output stays readable.
fn init_logging(config: &AppConfig, serving: bool) {
    let default_level = if serving {
        config.logging.level.as_str()
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
