//! Discovery Status Endpoint
//!
//! Exposes the current phase of the bootstrap state machine at GET /status.

use super::state::AppState;
use crate::discovery::DiscoveryPhase;
use axum::{extract::State, Json};
use serde::Serialize;

/// Discovery status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub node: String,
    pub phase: DiscoveryPhase,
    pub is_leader: bool,
}

/// GET /status - current bootstrap phase of this node
#[tracing::instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let phase = *state.phase_rx.borrow();
    Json(StatusResponse {
        node: state.node.to_string(),
        phase,
        is_leader: phase == DiscoveryPhase::Leader,
    })
}
