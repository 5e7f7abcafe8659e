//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the base configuration (file + CLI overrides)
//! - Load the initial snapshot and build the first handler
//! - Bind the listener and start the reload loop
//! - Join the server and the reload loop before returning
//!
//! # Design Decisions
//! - Fail fast: config, initial handler, bind and watcher creation are fatal
//! - Nothing after startup is fatal; reload failures keep the current handler
//! - Listener and reload settings are fixed at startup; reloads rebuild only
//!   the handler

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinError;

use crate::api::{self, BuildError};
use crate::config::{list_config_files, ConfigError, ConfigLoader, ObservabilityConfig, ReloadingConfig, ServiceConfig, TomlLoader};
use crate::http::{HttpServer, ServerHandle, ShutdownOutcome};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::ListenerError;
use crate::reload::{AtomicHandler, ConfigReloadLoop, ReloadError, ReloadSettings, WatchExit};

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build initial handler: {0}")]
    Handler(#[from] BuildError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("service task failed: {0}")]
    Task(#[from] JoinError),
}

/// Startup options, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Base configuration file, applied before the watch directory.
    pub config_file: Option<PathBuf>,
    /// Overrides `reloading.watch_dir`.
    pub watch_dir: Option<PathBuf>,
    /// Disable live reload regardless of configuration.
    pub no_reload: bool,
}

/// Base configuration resolved before logging and serving start.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    loader: TomlLoader,
    base: ServiceConfig,
    reloading: ReloadingConfig,
}

impl Bootstrap {
    pub fn load(options: &Options) -> Result<Self, StartupError> {
        let loader = TomlLoader::new(options.config_file.clone());
        let base = loader.load_files(&[])?;

        let mut reloading = base.reloading.clone();
        if let Some(dir) = &options.watch_dir {
            reloading.watch_dir = dir.clone();
        }
        if options.no_reload {
            reloading.enabled = false;
        }

        Ok(Self {
            loader,
            base,
            reloading,
        })
    }

    pub fn observability(&self) -> &ObservabilityConfig {
        &self.base.observability
    }

    pub fn reloading(&self) -> &ReloadingConfig {
        &self.reloading
    }

    /// Base file plus whatever the watch directory holds right now.
    ///
    /// A missing watch directory is not an error; the reload loop picks it up
    /// once it appears.
    pub fn initial_config(&self) -> Result<ServiceConfig, ConfigError> {
        if !self.reloading.enabled {
            return Ok(self.base.clone());
        }

        let paths = match list_config_files(&self.reloading.watch_dir, &self.reloading.suffix) {
            Ok(paths) => paths,
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    dir = %self.reloading.watch_dir.display(),
                    "Config directory does not exist yet, starting from base configuration"
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        tracing::info!(files = paths.len(), "Loading initial configuration");
        self.loader.load_files(&paths)
    }

    /// The reload loop for this configuration, if reloading is enabled.
    pub fn reload_loop(&self) -> Option<ConfigReloadLoop<TomlLoader>> {
        self.reloading.enabled.then(|| {
            ConfigReloadLoop::new(ReloadSettings::from(&self.reloading), self.loader.clone())
        })
    }
}

/// Run the service until `shutdown` fires and everything has stopped.
pub async fn run(bootstrap: Bootstrap, shutdown: Shutdown) -> Result<(), StartupError> {
    let config = bootstrap.initial_config()?;
    let handler = Arc::new(AtomicHandler::new(api::build_router(&config)?));

    tracing::info!(
        service = %config.site.name,
        responses = config.site.responses.len(),
        reload_enabled = bootstrap.reloading().enabled,
        "Configuration loaded"
    );

    let server = HttpServer::bind(ServerHandle::from_config(&config.api)).await?;
    run_service(server, handler, bootstrap.reload_loop(), shutdown).await
}

/// Serve through `handler`, reloading it from `reload_loop`, until shutdown.
///
/// Returns only after both the server's shutdown sequence and the reload loop
/// have finished.
pub async fn run_service<L>(
    server: HttpServer,
    handler: Arc<AtomicHandler>,
    reload_loop: Option<ConfigReloadLoop<L>>,
    shutdown: Shutdown,
) -> Result<(), StartupError>
where
    L: ConfigLoader<Snapshot = ServiceConfig>,
{
    let token = shutdown.subscribe();

    let reloader = match reload_loop {
        Some(reload_loop) => {
            let handler = Arc::clone(&handler);
            Some(reload_loop.start(&token, move |config: ServiceConfig| apply_reload(&handler, &config))?)
        }
        None => None,
    };

    let server_task = tokio::spawn(server.run(Arc::clone(&handler).into_router(), token));

    let outcome = server_task.await;
    let reload_exit = match reloader {
        Some(reloader) => Some(reloader.join().await),
        None => None,
    };

    match outcome? {
        ShutdownOutcome::Graceful => tracing::info!("Server shut down gracefully"),
        ShutdownOutcome::TimedOut => tracing::warn!("Server shut down after terminating connections"),
    }
    match reload_exit.transpose()? {
        Some(WatchExit::SourceClosed) => {
            tracing::warn!("Config reload loop had stopped early: watcher event source closed")
        }
        Some(WatchExit::Cancelled) | None => {}
    }

    tracing::info!(generation = handler.generation(), "Shutdown complete");
    Ok(())
}

/// Reload callback: build a handler from `config` and install it.
///
/// A build failure is logged and the current handler stays active.
pub fn apply_reload(handler: &AtomicHandler, config: &ServiceConfig) {
    match api::build_router(config) {
        Ok(router) => {
            handler.set(router);
            tracing::info!(
                generation = handler.generation(),
                service = %config.site.name,
                responses = config.site.responses.len(),
                "Configuration applied"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Rejected reloaded configuration, keeping current handler");
        }
    }
}
