//! Live configuration reload.
//!
//! # Data Flow
//! ```text
//! notify events ──┐
//!                 ├─▶ watcher.rs (single task, select over cancel/tick/event)
//! poll ticker ────┘        │
//!                          ├─ policy.rs decides "due?"
//!                          ├─ list dir, filter suffix, sort by name
//!                          ├─ ConfigLoader::load_files(paths)
//!                          └─▶ on_reload(snapshot)
//!                                  └─ build handler → handler.rs AtomicHandler::set
//! ```
//!
//! # Design Decisions
//! - Events only stamp the last change time; the ticker acts on it
//! - The pending marker is cleared before a reload is attempted
//! - A failed reload leaves the previous handler in place

pub mod handler;
pub mod policy;
pub mod watcher;

pub use handler::AtomicHandler;
pub use policy::ReloadPolicy;
pub use watcher::{ConfigReloadLoop, DirWatch, ReloadError, ReloadHandle, ReloadSettings, WatchExit};
