//! HTTP API Module
//!
//! REST endpoints for the huddle server.
//!
//! This module contains:
//! - `state`: Shared application state
//! - `health`: Liveness and readiness probes
//! - `status`: Discovery phase endpoint
//! - `metrics`: Prometheus metrics endpoint

mod health;
mod metrics;
mod state;
mod status;

pub use state::AppState;

use axum::{routing::get, Router};

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health checks
        .route("/healthz", get(health::health_check))
        .route("/readyz", get(health::readiness_check))
        // Discovery status
        .route("/status", get(status::get_status))
        // Observability
        .route("/metrics", get(metrics::get_metrics))
        .with_state(state)
}
