//! Cluster Membership Facade
//!
//! huddle does not implement the gossip layer; it consumes one. This
//! module is the seam: the [`Membership`] trait exposes the node's own
//! address, a membership snapshot, the join trigger, and an event
//! subscription. [`ChannelMembership`] is the in-process implementation
//! the embedding gossip layer drives (and the test suite scripts).

mod local;

pub use local::ChannelMembership;

use async_trait::async_trait;
use huddle_core::NodeAddress;
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Membership event delivered by the gossip layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// A member reached the Up state.
    MemberUp(NodeAddress),
    /// A member left or was downed.
    MemberRemoved(NodeAddress),
    /// The gossip layer's leader hint changed. `None` means no leader is
    /// currently known.
    LeaderChanged(Option<NodeAddress>),
}

/// Handle to the external membership layer.
#[async_trait]
pub trait Membership: Send + Sync + 'static {
    /// Stable address of this node.
    fn self_address(&self) -> NodeAddress;

    /// Snapshot of the members currently considered up.
    async fn members(&self) -> HashSet<NodeAddress>;

    /// Trigger cluster formation toward the given seed nodes.
    async fn join(&self, seeds: Vec<NodeAddress>) -> anyhow::Result<()>;

    /// Subscribe to membership events.
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent>;
}
