//! Structured Events
//!
//! Dedicated functions for the protocol's notable events, keeping field
//! naming consistent across the codebase.
//!
//! Event types:
//! - `leader_elected` - this node won the leader key
//! - `leadership_lost` - a refresh failure demoted this node
//! - `cluster_joined` - this node became a member via the seed list
//! - `seed_registered` - a seed entry was written
//! - `seed_deregistered` - a seed entry was removed

use tracing::{info, warn};

/// Emit a leader elected event
pub fn leader_elected(node: &str) {
    info!(
        event_type = "leader_elected",
        node = %node,
        "Leader elected"
    );
}

/// Emit a leadership lost event
pub fn leadership_lost(node: &str, reason: &str) {
    warn!(
        event_type = "leadership_lost",
        node = %node,
        reason = %reason,
        "Leadership lost"
    );
}

/// Emit a cluster joined event
pub fn cluster_joined(node: &str) {
    info!(
        event_type = "cluster_joined",
        node = %node,
        "Cluster joined"
    );
}

/// Emit a seed registered event
pub fn seed_registered(member: &str, key: &str) {
    info!(
        event_type = "seed_registered",
        member = %member,
        key = %key,
        "Seed registered"
    );
}

/// Emit a seed deregistered event
pub fn seed_deregistered(member: &str, key: &str) {
    info!(
        event_type = "seed_deregistered",
        member = %member,
        key = %key,
        "Seed deregistered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_functions_dont_panic() {
        // These should not panic
        leader_elected("10.0.0.1:9000");
        leadership_lost("10.0.0.1:9000", "store transport failure");
        cluster_joined("10.0.0.2:9000");
        seed_registered("10.0.0.2:9000", "/huddle/seeds/00000000000000000001");
        seed_deregistered("10.0.0.2:9000", "/huddle/seeds/00000000000000000001");
    }
}
