//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use live_config_server::{HttpServer, ServerHandle, ShutdownOutcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A server running on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<ShutdownOutcome>,
}

#[allow(dead_code)]
impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Bind 127.0.0.1:0 and serve `app` in the background.
pub async fn start_server(app: Router, shutdown_timeout: Duration, header_read_timeout: Duration) -> RunningServer {
    let server = HttpServer::bind(test_handle(shutdown_timeout, header_read_timeout))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.run(app, shutdown.clone()));

    RunningServer { addr, shutdown, task }
}

pub fn test_handle(shutdown_timeout: Duration, header_read_timeout: Duration) -> ServerHandle {
    ServerHandle {
        address: "127.0.0.1:0".to_string(),
        shutdown_timeout,
        header_read_timeout,
    }
}

/// Client without pooling or proxies, so each request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it returns true or `deadline` passes.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
