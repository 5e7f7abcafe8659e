//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! listen address (host:port from config)
//!     → listener.rs (resolve and bind, fatal on failure)
//!     → http::server accept loop
//!     → connection.rs (per-connection id and live count)
//! ```

pub mod connection;
pub mod listener;
