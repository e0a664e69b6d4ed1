//! Observability
//!
//! Tracing subscriber setup, Prometheus metrics, and structured event
//! emission for the bootstrap protocol.

pub mod events;
pub mod metrics;
pub mod tracing;

pub use metrics::MetricsState;
pub use tracing::init_tracing;
