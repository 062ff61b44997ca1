//! Health check endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::db::health_check as db_health_check;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status ("ok" or "unhealthy")
    pub status: String,

    /// "connected", "disconnected" or "in_memory"
    pub database: String,

    /// "connected" or "not_configured"
    pub nats: String,

    pub uptime_seconds: u64,

    pub version: String,
}

/// Health check.
///
/// `GET /health`
///
/// Returns `503 Service Unavailable` when the database cannot be reached.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.db {
        Some(pool) if db_health_check(pool).await => "connected",
        Some(_) => "disconnected",
        None => "in_memory",
    };
    let healthy = database != "disconnected";

    let response = HealthResponse {
        status: if healthy { "ok" } else { "unhealthy" }.to_string(),
        database: database.to_string(),
        nats: if state.nats_connected {
            "connected"
        } else {
            "not_configured"
        }
        .to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}
