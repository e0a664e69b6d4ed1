//! Discovery Message Types
//!
//! Messages for the two bootstrap state machines. External callers use
//! [`Start`], [`Shutdown`] and the query messages; everything else is a
//! store reply or timer delivery the actors send themselves.

use crate::cluster::ClusterEvent;
use crate::store::{KeyValue, StoreError};
use huddle_core::NodeAddress;
use kameo::Reply;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use strum::Display;

/// States of the discovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, Reply)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    /// Ensuring the shared namespace exists in the store
    Initial,
    /// Contending for the leader key
    Election,
    /// Holding the leader key; seed-list maintenance is running
    Leader,
    /// A member of a cluster led by another node
    Follower,
    /// Seeds obtained, waiting for the membership layer to admit us
    JoiningCluster,
    /// Election lost; fetching the published seed list
    AwaitingSeedsFetch,
}

impl DiscoveryPhase {
    /// True once the node has a settled role in the cluster.
    pub fn is_settled(&self) -> bool {
        matches!(self, DiscoveryPhase::Leader | DiscoveryPhase::Follower)
    }
}

/// Kick off the bootstrap protocol.
#[derive(Debug, Clone)]
pub struct Start;

/// Demote if leading and release background tasks before stopping.
#[derive(Debug, Clone)]
pub struct Shutdown;

/// Query the current phase.
#[derive(Debug, Clone)]
pub struct GetPhase;

/// Reply from the namespace `create_dir`.
#[derive(Debug)]
pub(crate) struct NamespaceReady(pub Result<(), StoreError>);

/// Enter (or re-enter) the election and place a bid.
#[derive(Debug, Clone)]
pub(crate) struct RunElection;

/// Reply from the election compare-and-set.
#[derive(Debug)]
pub(crate) struct ElectionOutcome(pub Result<(), StoreError>);

/// Periodic leader-key refresh trigger.
#[derive(Debug, Clone)]
pub(crate) struct RefreshTick;

/// Reply from the refresh compare-and-set.
#[derive(Debug)]
pub(crate) struct RefreshOutcome(pub Result<(), StoreError>);

/// Re-issue the seed-list fetch.
#[derive(Debug, Clone)]
pub(crate) struct FetchSeeds;

/// Reply from the seed-list fetch.
#[derive(Debug)]
pub(crate) struct SeedsFetched(pub Result<Vec<KeyValue>, StoreError>);

/// A membership event forwarded from the cluster subscription.
#[derive(Debug, Clone)]
pub(crate) struct ClusterEventMsg(pub ClusterEvent);

/// States of the seed-list state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SeedListState {
    /// Waiting for the leader's membership snapshot
    AwaitingInitialState,
    /// Reconciling the snapshot against what the store already holds
    AwaitingRegisteredSeeds,
    /// Ready to issue the next store mutation
    AwaitingCommand,
    /// Exactly one store mutation in flight
    AwaitingEtcdReply,
}

/// Membership snapshot that starts (or restarts) seed-list reconciliation.
#[derive(Debug, Clone)]
pub struct InitialState(pub HashSet<NodeAddress>);

/// A membership delta for the seed list to mirror into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedCommand {
    MemberAdded(NodeAddress),
    MemberRemoved(NodeAddress),
}

impl SeedCommand {
    pub fn address(&self) -> &NodeAddress {
        match self {
            SeedCommand::MemberAdded(addr) | SeedCommand::MemberRemoved(addr) => addr,
        }
    }
}

/// Reply from the reconciliation `list_dir`.
#[derive(Debug)]
pub(crate) struct RegisteredSeeds(pub Result<Vec<KeyValue>, StoreError>);

/// Reply from an in-flight `create_in_order` or `delete`.
#[derive(Debug)]
pub(crate) struct MutationDone(pub Result<KeyValue, StoreError>);

/// Query the seed-list actor's internal view (used by tests and status).
#[derive(Debug, Clone)]
pub struct GetSeedListSnapshot;

/// The seed-list actor's internal view.
#[derive(Debug, Clone, Reply)]
pub struct SeedListSnapshot {
    pub state: SeedListState,
    pub current_seeds: HashSet<NodeAddress>,
    pub address_mapping: HashMap<NodeAddress, String>,
    pub stashed: usize,
}
