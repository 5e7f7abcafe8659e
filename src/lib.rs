//! Live configuration reload with coordinated graceful shutdown.
//!
//! # Architecture Overview
//!
//! ```text
//!   config dir (*.toml) ──notify──▶ reload::watcher ──▶ config::loader ──▶ api::build_router
//!                                   (debounce, tick)     (merge in order)          │
//!                                                                                  ▼
//!   client ──▶ net::listener ──▶ http::server ──▶ reload::AtomicHandler ◀── set(new router)
//!                                   ▲               (lock-free get per request)
//!                                   │
//!   SIGINT/SIGTERM ──▶ lifecycle::Shutdown ──▶ stop accepting, bounded drain,
//!                                              stop reload loop, join both
//! ```

pub mod api;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod reload;

pub use config::ServiceConfig;
pub use http::{HttpServer, ServerHandle, ShutdownOutcome};
pub use lifecycle::Shutdown;
pub use reload::{AtomicHandler, ConfigReloadLoop, ReloadPolicy, WatchExit};
