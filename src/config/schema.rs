//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from TOML files, and every
//! section has defaults so that a partial file (or none at all) is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener and connection settings.
    pub api: ApiConfig,

    /// Live reload settings.
    pub reloading: ReloadingConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Content served by the request handler.
    pub site: SiteConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Host or IP address to bind.
    pub host: String,

    /// Port to bind. `0` asks the OS for a free port.
    pub port: u16,

    /// Time allowed for a client to send the full request head.
    pub header_read_timeout_secs: u64,

    /// Time allowed for in-flight connections to finish after shutdown begins.
    pub shutdown_timeout_secs: u64,
}

impl ApiConfig {
    /// `host:port`, with IPv6 hosts bracketed.
    pub fn listen_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            header_read_timeout_secs: 2,
            shutdown_timeout_secs: 60,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReloadingConfig {
    /// Watch the directory and rebuild the handler when it changes.
    pub enabled: bool,

    /// Directory holding configuration fragments.
    pub watch_dir: PathBuf,

    /// Minimum time between two reload attempts, in seconds.
    pub min_interval_secs: u64,

    /// File name suffix a fragment must carry to be considered.
    pub suffix: String,
}

impl Default for ReloadingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_dir: PathBuf::from("config.d"),
            min_interval_secs: 10,
            suffix: ".toml".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Content served by the handler built from this configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// Service name reported by `/health`.
    pub name: String,

    /// Fixed responses mounted as `GET` routes.
    pub responses: Vec<ResponseConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "live-config-server".to_string(),
            responses: Vec::new(),
        }
    }
}

/// A fixed response served at a path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResponseConfig {
    /// Route path, must start with `/`.
    pub path: String,

    /// HTTP status code (default: 200).
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response body.
    #[serde(default)]
    pub body: String,

    /// Content type header (default: `text/plain; charset=utf-8`).
    pub content_type: Option<String>,
}

fn default_status() -> u16 {
    200
}
