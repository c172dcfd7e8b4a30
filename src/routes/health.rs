//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe, always 200 while the process runs
//! - /ready, /readyz - Readiness probe, 200 only when the record store answers
//! - /version - Build information
//!
//! Without MongoDB (dev mode fallback) the in-memory store is always ready.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::response::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since startup
    pub uptime: u64,
    pub timestamp: String,
    pub mode: &'static str,
    /// `mongodb` or `memory`
    pub store: &'static str,
    pub classifier_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub name: &'static str,
    pub version: &'static str,
}

fn build_health_response(state: &AppState, error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: error.is_none(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: if state.mongo.is_some() {
            "mongodb"
        } else {
            "memory"
        },
        classifier_configured: state.args.classifier_url.is_some(),
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    json_response(StatusCode::OK, &build_health_response(&state, None))
}

/// Handle readiness probe (/ready, /readyz)
pub async fn readiness_check(state: Arc<AppState>) -> Response<FullBody> {
    let error = match &state.mongo {
        Some(mongo) => mongo
            .ping()
            .await
            .err()
            .map(|e| format!("MongoDB unavailable: {}", e)),
        None => None,
    };

    let status = if error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &build_health_response(&state, error))
}

/// Handle /version
pub fn version_info() -> Response<FullBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}
