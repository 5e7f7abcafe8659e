//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load base config → initial snapshot → build handler → bind → serve + watch
//!
//! Shutdown (shutdown.rs):
//!     Signal received → server stops accepting → bounded drain → join reload loop → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One cancellation token is observed by both the server and the reload loop
//! - Shutdown has timeout: forced termination after deadline
//! - The process reports itself stopped only after both tasks are joined

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{apply_reload, run, run_service, Bootstrap, Options, StartupError};
