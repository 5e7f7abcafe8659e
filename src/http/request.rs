//! Per-request plumbing shared by every handler generation.
//!
//! # Responsibilities
//! - Assign a request ID (UUID v4) unless the client sent one
//! - Echo the ID back on the response
//! - Trace each request with its ID
//!
//! These layers wrap the swappable handler, so they stay in place across reloads.

use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Wrap `router` with request ID and tracing layers.
pub fn with_request_layers(router: Router) -> Router {
    router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
