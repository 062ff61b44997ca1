//! HTTP handlers for the Weft engine API.

pub mod executions;
pub mod health;
pub mod interactions;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub use health::health_check;

/// All engine routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/executions", post(executions::start))
        .route("/api/executions/{execution_id}", get(executions::get))
        .route(
            "/api/executions/{execution_id}/pause",
            get(executions::pause_status),
        )
        .route(
            "/api/executions/{execution_id}/resume",
            post(executions::resume),
        )
        .route(
            "/api/executions/{execution_id}/cancel",
            post(executions::cancel),
        )
        .route(
            "/api/interactions/{interaction_id}/respond",
            post(interactions::respond),
        )
}
