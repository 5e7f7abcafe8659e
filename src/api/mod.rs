//! Request handling built from a configuration snapshot.
//!
//! Every reload produces a fresh router from [`build_router`]; the router is
//! then installed in the [`AtomicHandler`](crate::reload::AtomicHandler).
//! Building fails on inconsistent input, in which case the caller keeps the
//! router it already has.

pub mod handlers;

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, StatusCode},
    routing::get,
    Router,
};

use crate::config::{ResponseConfig, ServiceConfig};
use self::handlers::*;

const RESERVED_PATHS: &[&str] = &["/health", "/config"];
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Error type for handler construction.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("response path {0:?} must start with '/' and contain no route parameters")]
    InvalidPath(String),

    #[error("response path {0:?} is declared more than once")]
    DuplicatePath(String),

    #[error("response path {0:?} is reserved")]
    ReservedPath(String),

    #[error("invalid status code {status} for {path:?}")]
    InvalidStatus { path: String, status: u16 },

    #[error("invalid content type {content_type:?} for {path:?}")]
    InvalidContentType { path: String, content_type: String },
}

/// Build the request handler for a configuration snapshot.
pub fn build_router(config: &ServiceConfig) -> Result<Router, BuildError> {
    let site = &config.site;
    let mut seen = HashSet::new();
    let mut router = Router::new();

    for entry in &site.responses {
        let response = fixed_response(entry)?;
        if RESERVED_PATHS.contains(&entry.path.as_str()) {
            return Err(BuildError::ReservedPath(entry.path.clone()));
        }
        if !seen.insert(entry.path.as_str()) {
            return Err(BuildError::DuplicatePath(entry.path.clone()));
        }
        router = router.route(&entry.path, get(move || async move { response }));
    }

    let state = SiteState {
        name: Arc::from(site.name.as_str()),
        responses: site.responses.len(),
    };

    tracing::debug!(service = %site.name, responses = state.responses, "Handler built");

    Ok(router
        .route("/health", get(get_health))
        .route("/config", get(get_config))
        .with_state(state))
}

fn fixed_response(entry: &ResponseConfig) -> Result<FixedResponse, BuildError> {
    if !is_literal_path(&entry.path) {
        return Err(BuildError::InvalidPath(entry.path.clone()));
    }

    let status = StatusCode::from_u16(entry.status).map_err(|_| BuildError::InvalidStatus {
        path: entry.path.clone(),
        status: entry.status,
    })?;

    let content_type = entry.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
    let content_type =
        HeaderValue::from_str(content_type).map_err(|_| BuildError::InvalidContentType {
            path: entry.path.clone(),
            content_type: content_type.to_string(),
        })?;

    Ok(FixedResponse {
        status,
        content_type,
        body: Arc::from(entry.body.as_str()),
    })
}

/// Paths are mounted verbatim, so anything the router would read as a
/// parameter or wildcard is rejected.
fn is_literal_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains(['{', '}', '*'])
        && !path.split('/').any(|segment| segment.starts_with(':'))
}
