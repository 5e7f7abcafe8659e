//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! base file (--config) + watch dir fragments (*.toml, sorted by name)
//!     → loader.rs (read, parse, deep-merge in order)
//!     → ServiceConfig (immutable snapshot)
//!     → handed to the reload callback
//!
//! On change:
//!     reload::watcher detects and debounces
//!     → loader.rs loads a fresh snapshot
//!     → api::build_router builds a new handler
//!     → atomic swap in reload::handler
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Semantic checks belong to whoever consumes the snapshot

pub mod loader;
pub mod schema;

pub use loader::{list_config_files, ConfigError, ConfigLoader, TomlLoader};
pub use schema::{
    ApiConfig, ObservabilityConfig, ReloadingConfig, ResponseConfig, ServiceConfig, SiteConfig,
};
