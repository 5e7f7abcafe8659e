//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Bind the listener (fatal on failure)
//! - Accept connections and serve them with HTTP/1.1
//! - Bound how long a client may take to send request headers, counted from
//!   accept so an idle socket is closed too
//! - On cancellation: stop accepting, give in-flight connections a bounded
//!   grace period, then terminate whatever is left
//!
//! # Design Decisions
//! - `run` returns only after every connection task has finished, so "returned"
//!   means "no further request processing"
//! - The grace period is a hard deadline, not cooperative
//! - Request-scoped work can watch a [`CancellationToken`] (request extension)
//!   that fires once the grace period is over

use std::net::SocketAddr;
use std::time::Duration;

use axum::{Extension, Router};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::ApiConfig;
use crate::http::request::with_request_layers;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{self, ListenerError};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Immutable server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandle {
    /// `host:port` to bind.
    pub address: String,
    /// Grace period for in-flight connections once shutdown begins.
    pub shutdown_timeout: Duration,
    /// Limit on receiving a request head, independent of shutdown.
    pub header_read_timeout: Duration,
}

impl ServerHandle {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            address: api.listen_address(),
            shutdown_timeout: Duration::from_secs(api.shutdown_timeout_secs),
            header_read_timeout: Duration::from_secs(api.header_read_timeout_secs),
        }
    }
}

impl Default for ServerHandle {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

/// How the shutdown sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection finished within the grace period.
    Graceful,
    /// The grace period elapsed; remaining connections were terminated.
    TimedOut,
}

/// HTTP server with bounded graceful shutdown.
pub struct HttpServer {
    handle: ServerHandle,
    listener: TcpListener,
}

impl HttpServer {
    /// Bind the configured address. Failure here is fatal for the service.
    pub async fn bind(handle: ServerHandle) -> Result<Self, ListenerError> {
        let listener = listener::bind(&handle.address).await?;
        Ok(Self { handle, listener })
    }

    /// Get the local address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Serve `app` until `shutdown` fires, then run the shutdown sequence.
    pub async fn run(self, app: Router, shutdown: CancellationToken) -> ShutdownOutcome {
        let Self { handle, listener } = self;

        // Cancelled once the grace period is over, or if this future is dropped.
        let request_scope = CancellationToken::new();
        let _request_scope_guard = request_scope.clone().drop_guard();

        let app = with_request_layers(app).layer(Extension(request_scope.clone()));

        // The header timer starts as soon as the connection is polled, before
        // the first byte arrives.
        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(handle.header_read_timeout);

        let graceful = GracefulShutdown::new();
        let tracker = ConnectionTracker::new();
        let mut connections = JoinSet::new();

        tracing::info!(
            address = %handle.address,
            shutdown_timeout_secs = handle.shutdown_timeout.as_secs(),
            header_read_timeout_ms = handle.header_read_timeout.as_millis() as u64,
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };

                    // Reap finished connection tasks.
                    while connections.try_join_next().is_some() {}

                    let guard = tracker.track();
                    tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "Connection accepted");

                    let service = TowerToHyperService::new(app.clone());
                    let conn = builder.serve_connection(TokioIo::new(stream), service);
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(connection_id = %guard.id(), error = %e, "Connection ended with error");
                        }
                        drop(guard);
                    });
                }
            }
        }

        // Stop accepting before waiting on anything else.
        drop(listener);
        tracing::info!(
            in_flight = tracker.active_count(),
            "Shutdown started, no longer accepting connections"
        );

        let outcome = match time::timeout(handle.shutdown_timeout, graceful.shutdown()).await {
            Ok(()) => {
                tracing::info!("All connections finished");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    remaining = tracker.active_count(),
                    "Shutdown timeout elapsed, terminating remaining connections"
                );
                ShutdownOutcome::TimedOut
            }
        };

        request_scope.cancel();
        connections.shutdown().await;

        tracing::info!("HTTP server stopped");
        outcome
    }
}
