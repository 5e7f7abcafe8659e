//! Built-in routes and the fixed responses mounted from `[[site.responses]]`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// State shared by the built-in routes of one handler generation.
#[derive(Debug, Clone)]
pub struct SiteState {
    pub name: Arc<str>,
    pub responses: usize,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ConfigSummary {
    pub service: String,
    pub responses: usize,
}

pub async fn get_health(State(state): State<SiteState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        service: state.name.to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_config(State(state): State<SiteState>) -> Json<ConfigSummary> {
    Json(ConfigSummary {
        service: state.name.to_string(),
        responses: state.responses,
    })
}

/// A configured response, rendered on every request.
#[derive(Debug, Clone)]
pub struct FixedResponse {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub body: Arc<str>,
}

impl IntoResponse for FixedResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body.to_string(),
        )
            .into_response()
    }
}
