//! Live-reloading HTTP service.
//!
//! Serves fixed responses described by TOML configuration, rebuilding its
//! handler whenever files in the watch directory change, and shuts down
//! gracefully on SIGINT/SIGTERM.

use std::path::PathBuf;

use clap::Parser;

use live_config_server::lifecycle::{self, signals, Bootstrap, Options, Shutdown};
use live_config_server::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "live-config-server")]
#[command(about = "HTTP service with live configuration reload", long_about = None)]
struct Cli {
    /// Base configuration file, applied before the watch directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of `*.toml` fragments to watch (overrides the config file).
    #[arg(short, long)]
    watch_dir: Option<PathBuf>,

    /// Disable live reload.
    #[arg(long)]
    no_reload: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let options = Options {
        config_file: cli.config,
        watch_dir: cli.watch_dir,
        no_reload: cli.no_reload,
    };

    let bootstrap = Bootstrap::load(&options)?;
    logging::init(bootstrap.observability())?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "live-config-server starting");

    let observability = bootstrap.observability();
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let signal_task = signals::spawn_signal_handler(shutdown.clone());

    let result = lifecycle::run(bootstrap, shutdown).await;
    signal_task.abort();

    if let Err(e) = &result {
        tracing::error!(error = %e, "Service failed");
    }
    Ok(result?)
}
