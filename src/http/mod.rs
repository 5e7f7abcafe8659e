//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (accept loop, HTTP/1.1, header read timeout from accept)
//!     → request.rs (request ID, tracing)
//!     → reload::AtomicHandler (current handler, read once per request)
//!     → api router built from the active snapshot
//! ```

pub mod request;
pub mod server;

pub use request::{with_request_layers, X_REQUEST_ID};
pub use server::{HttpServer, ServerHandle, ShutdownOutcome};
