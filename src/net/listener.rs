//! TCP listener binding.
//!
//! Binding is the one network step that is allowed to fail the process: if the
//! address cannot be bound the service never starts serving.

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Bind a TCP listener at `address` (`host:port`, host may be a name).
pub async fn bind(address: &str) -> Result<TcpListener, ListenerError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| ListenerError::Bind {
            address: address.to_string(),
            source,
        })?;

    match listener.local_addr() {
        Ok(local_addr) => tracing::info!(address = %local_addr, "Listener bound"),
        Err(e) => tracing::warn!(address, error = %e, "Listener bound, local address unavailable"),
    }

    Ok(listener)
}
