//! Prometheus Metrics
//!
//! Defines and initializes the Prometheus metrics for the huddle server.
//!
//! Metrics tracked:
//! - `huddle_elections_won_total` - counter of leader elections won
//! - `huddle_leadership_lost_total` - counter of yielded leaderships
//! - `huddle_store_retries_total` - counter of retried store operations by op
//! - `huddle_seeds_created_total` - counter of seed entries written
//! - `huddle_seeds_deleted_total` - counter of seed entries removed
//! - `huddle_stash_overflow_total` - counter of membership deltas dropped at the stash cap

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// State containing the Prometheus handle for metrics export
#[derive(Clone)]
pub struct MetricsState {
    pub prometheus_handle: PrometheusHandle,
}

/// Set up the Prometheus recorder, register metric descriptions, and
/// return the handle used to render `/metrics`.
pub fn init_metrics() -> Result<MetricsState, Box<dyn std::error::Error + Send + Sync>> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_metric_descriptions();

    Ok(MetricsState {
        prometheus_handle: handle,
    })
}

/// Register descriptions for all metrics
fn register_metric_descriptions() {
    describe_counter!(
        "huddle_elections_won_total",
        "Total number of leader elections won by this node"
    );
    describe_counter!(
        "huddle_leadership_lost_total",
        "Total number of times this node yielded leadership"
    );
    describe_counter!(
        "huddle_store_retries_total",
        "Total number of store operations retried after a failure"
    );
    describe_counter!(
        "huddle_seeds_created_total",
        "Total number of seed entries written to the store"
    );
    describe_counter!(
        "huddle_seeds_deleted_total",
        "Total number of seed entries removed from the store"
    );
    describe_counter!(
        "huddle_stash_overflow_total",
        "Total number of membership deltas dropped at the stash cap"
    );
}

/// Record a won election
pub fn record_election_won() {
    counter!("huddle_elections_won_total").increment(1);
}

/// Record a yielded leadership
pub fn record_leadership_lost() {
    counter!("huddle_leadership_lost_total").increment(1);
}

/// Record a store operation scheduled for retry
pub fn record_store_retry(operation: &str) {
    counter!("huddle_store_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a seed entry written
pub fn record_seed_created() {
    counter!("huddle_seeds_created_total").increment(1);
}

/// Record a seed entry removed
pub fn record_seed_deleted() {
    counter!("huddle_seeds_deleted_total").increment(1);
}

/// Record a membership delta dropped at the stash cap
pub fn record_stash_overflow() {
    counter!("huddle_stash_overflow_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_recording() {
        // These functions should not panic when called
        record_election_won();
        record_leadership_lost();
        record_store_retry("election");
        record_seed_created();
        record_seed_deleted();
        record_stash_overflow();
    }
}
