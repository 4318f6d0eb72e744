//! Health check endpoint
//!
//! `GET /health` (also under `/api/v1`) answers without authentication.
//! The service is healthy once it is serving; `detail_store` reports which
//! detail backend is active so a dev-mode in-memory fallback is visible.

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::response::{json_response, FullBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Git commit the binary was built from
    pub commit: &'static str,
    pub built_at: &'static str,
    /// "development" or "production"
    pub mode: &'static str,
    /// Detail store backend ("mongodb" or "memory")
    pub detail_store: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
}

pub fn health_check(state: &AppState) -> Response<FullBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built_at: env!("BUILD_TIMESTAMP"),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        detail_store: state.engine.details().backend(),
        uptime: state.started_at.elapsed().as_secs(),
    };

    json_response(StatusCode::OK, &response)
}
