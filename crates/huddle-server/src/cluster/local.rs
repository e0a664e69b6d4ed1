//! Channel-Backed Membership
//!
//! [`ChannelMembership`] keeps the membership snapshot current from the
//! events pushed into it and fans the events out over a broadcast
//! channel. The embedding gossip layer calls [`ChannelMembership::publish`]
//! as its own view changes; tests script it directly.

use super::{ClusterEvent, Membership};
use async_trait::async_trait;
use huddle_core::NodeAddress;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-process [`Membership`] implementation.
pub struct ChannelMembership {
    self_address: NodeAddress,
    members: Mutex<HashSet<NodeAddress>>,
    events: broadcast::Sender<ClusterEvent>,
    joined: Mutex<Vec<Vec<NodeAddress>>>,
}

impl ChannelMembership {
    pub fn new(self_address: NodeAddress) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            self_address,
            members: Mutex::new(HashSet::new()),
            events,
            joined: Mutex::new(Vec::new()),
        }
    }

    /// Feed one membership event in: the snapshot is updated and the
    /// event fanned out to subscribers.
    pub fn publish(&self, event: ClusterEvent) {
        {
            let mut members = self.members.lock().unwrap();
            match &event {
                ClusterEvent::MemberUp(addr) => {
                    members.insert(addr.clone());
                }
                ClusterEvent::MemberRemoved(addr) => {
                    members.remove(addr);
                }
                ClusterEvent::LeaderChanged(_) => {}
            }
        }
        debug!(event = ?event, "Publishing membership event");
        // No subscribers yet is fine; events before the FSM starts are
        // not part of its contract.
        let _ = self.events.send(event);
    }

    /// Seed lists this node was asked to join through, in order.
    pub fn join_attempts(&self) -> Vec<Vec<NodeAddress>> {
        self.joined.lock().unwrap().clone()
    }
}

#[async_trait]
impl Membership for ChannelMembership {
    fn self_address(&self) -> NodeAddress {
        self.self_address.clone()
    }

    async fn members(&self) -> HashSet<NodeAddress> {
        self.members.lock().unwrap().clone()
    }

    async fn join(&self, seeds: Vec<NodeAddress>) -> anyhow::Result<()> {
        info!(seed_count = seeds.len(), "Joining cluster via seed nodes");
        self.joined.lock().unwrap().push(seeds);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_tracks_published_events() {
        let membership = ChannelMembership::new(NodeAddress::new("self:9000"));
        let a = NodeAddress::new("a:9000");
        let b = NodeAddress::new("b:9000");

        membership.publish(ClusterEvent::MemberUp(a.clone()));
        membership.publish(ClusterEvent::MemberUp(b.clone()));
        membership.publish(ClusterEvent::MemberRemoved(a.clone()));

        let members = membership.members().await;
        assert!(!members.contains(&a));
        assert!(members.contains(&b));
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let membership = ChannelMembership::new(NodeAddress::new("self:9000"));
        let mut rx = membership.subscribe();

        let a = NodeAddress::new("a:9000");
        membership.publish(ClusterEvent::MemberUp(a.clone()));
        membership.publish(ClusterEvent::LeaderChanged(Some(a.clone())));

        assert_eq!(rx.recv().await.unwrap(), ClusterEvent::MemberUp(a.clone()));
        assert_eq!(
            rx.recv().await.unwrap(),
            ClusterEvent::LeaderChanged(Some(a))
        );
    }

    #[tokio::test]
    async fn join_attempts_are_recorded() {
        let membership = ChannelMembership::new(NodeAddress::new("self:9000"));
        let seeds = vec![NodeAddress::new("a:9000"), NodeAddress::new("b:9000")];
        membership.join(seeds.clone()).await.unwrap();
        assert_eq!(membership.join_attempts(), vec![seeds]);
    }
}
