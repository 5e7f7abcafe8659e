//! Atomically swappable request handler.
//!
//! The active handler lives in an [`ArcSwap`]. Readers take a reference-counted
//! snapshot without locking; a request keeps the snapshot it started with for
//! its whole lifetime, even if a reload installs a new handler meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use crate::observability::metrics;

/// Holds the currently active router.
pub struct AtomicHandler {
    current: ArcSwap<Router>,
    generation: AtomicU64,
}

impl AtomicHandler {
    pub fn new(initial: Router) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
        }
    }

    /// The router new requests are dispatched to.
    pub fn get(&self) -> Arc<Router> {
        self.current.load_full()
    }

    /// Install a new router. Requests already dispatched keep the old one.
    pub fn set(&self, router: Router) {
        self.current.store(Arc::new(router));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_handler_swap();
        tracing::debug!(generation, "Request handler swapped");
    }

    /// Number of times [`set`](Self::set) has been called.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// A router that forwards every request to whichever handler is current
    /// when the request arrives.
    pub fn into_router(self: Arc<Self>) -> Router {
        Router::new().fallback(dispatch).with_state(self)
    }
}

async fn dispatch(State(handler): State<Arc<AtomicHandler>>, request: Request) -> Response {
    let router = Router::clone(&handler.get());
    match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
