//! Application State
//!
//! Shared state passed to all API handlers.

use crate::discovery::DiscoveryPhase;
use crate::observability::MetricsState;
use crate::store::KvStore;
use huddle_core::NodeAddress;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub node: NodeAddress,
    pub store: Arc<dyn KvStore>,
    pub phase_rx: watch::Receiver<DiscoveryPhase>,
    pub metrics_state: Option<MetricsState>,
}
