//! Seed-List Maintenance Actor
//!
//! Owned by the current leader. Mirrors cluster membership into the seed
//! directory in the store: one entry per live member, created under a
//! store-generated key that is remembered for the eventual delete.
//!
//! Writes are strictly serialized: while one mutation is in flight the
//! actor sits in `AwaitingEtcdReply` and stashes incoming membership
//! deltas, replaying them in arrival order once the reply lands. A failed
//! mutation is re-scheduled as the original command after the retry
//! delay, so no delta is lost across transient store outages.

use super::messages::{
    GetSeedListSnapshot, InitialState, MutationDone, RegisteredSeeds, SeedCommand,
    SeedListSnapshot, SeedListState,
};
use super::retry;
use crate::observability::{events, metrics};
use crate::store::{KvStore, StoreError};
use huddle_core::{DiscoveryConfig, NodeAddress};
use kameo::actor::ActorRef;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Upper bound on stashed membership deltas. Membership churn is low;
/// hitting this means the store has been unreachable for far too long.
const MAX_STASHED: usize = 10_000;

/// Actor maintaining the persisted seed list for the current leader.
#[derive(Actor)]
pub struct SeedListActor {
    store: Arc<dyn KvStore>,
    config: Arc<DiscoveryConfig>,
    state: SeedListState,
    /// Local view of live members, kept current as commands apply.
    current_seeds: HashSet<NodeAddress>,
    /// Member address -> exact store key holding its seed entry.
    address_mapping: HashMap<NodeAddress, String>,
    /// Deltas that arrived while a store operation was outstanding.
    stash: VecDeque<SeedCommand>,
    /// The command whose mutation is in flight, for the retry path.
    pending: Option<SeedCommand>,
}

impl SeedListActor {
    pub fn new(store: Arc<dyn KvStore>, config: Arc<DiscoveryConfig>) -> Self {
        Self {
            store,
            config,
            state: SeedListState::AwaitingInitialState,
            current_seeds: HashSet::new(),
            address_mapping: HashMap::new(),
            stash: VecDeque::new(),
            pending: None,
        }
    }

    fn stash_command(&mut self, command: SeedCommand) {
        if self.stash.len() >= MAX_STASHED {
            error!(
                member = %command.address(),
                stashed = self.stash.len(),
                "Seed-list stash overflow, dropping membership delta"
            );
            metrics::record_stash_overflow();
            return;
        }
        trace!(member = %command.address(), state = %self.state, "Stashing membership delta");
        self.stash.push_back(command);
    }

    /// Apply one command. May leave the actor in `AwaitingEtcdReply`.
    fn apply_command(&mut self, command: SeedCommand, actor: ActorRef<Self>) {
        match &command {
            SeedCommand::MemberAdded(addr) => {
                self.current_seeds.insert(addr.clone());
                let store = self.store.clone();
                let dir = self.config.seeds_path.clone();
                let value = addr.to_string();
                self.state = SeedListState::AwaitingEtcdReply;
                self.pending = Some(command);
                retry::call_store(
                    actor,
                    async move { store.create_in_order(&dir, &value).await },
                    MutationDone,
                );
            }
            SeedCommand::MemberRemoved(addr) => {
                self.current_seeds.remove(addr);
                match self.address_mapping.get(addr) {
                    Some(key) => {
                        let store = self.store.clone();
                        let key = key.clone();
                        self.state = SeedListState::AwaitingEtcdReply;
                        self.pending = Some(command);
                        retry::call_store(
                            actor,
                            async move { store.delete(&key).await },
                            MutationDone,
                        );
                    }
                    None => {
                        // Never registered (or already deleted); nothing to do.
                        debug!(member = %addr, "Removed member has no seed entry");
                    }
                }
            }
        }
    }

    /// Replay stashed deltas in arrival order until one of them puts a
    /// mutation in flight.
    fn drain_stash(&mut self, actor: &ActorRef<Self>) {
        while self.state == SeedListState::AwaitingCommand {
            let Some(command) = self.stash.pop_front() else {
                break;
            };
            self.apply_command(command, actor.clone());
        }
    }
}

impl Message<InitialState> for SeedListActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: InitialState,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state != SeedListState::AwaitingInitialState {
            debug!(state = %self.state, "Dropping snapshot outside AwaitingInitialState");
            return;
        }

        debug!(members = msg.0.len(), "Reconciling membership snapshot against store");
        self.current_seeds = msg.0;
        self.state = SeedListState::AwaitingRegisteredSeeds;

        let store = self.store.clone();
        let dir = self.config.seeds_path.clone();
        retry::call_store(
            ctx.actor_ref(),
            async move { store.list_dir(&dir).await },
            RegisteredSeeds,
        );
    }
}

impl Message<SeedCommand> for SeedListActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: SeedCommand,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state == SeedListState::AwaitingCommand {
            self.apply_command(msg, ctx.actor_ref());
        } else {
            self.stash_command(msg);
        }
    }
}

impl Message<RegisteredSeeds> for SeedListActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: RegisteredSeeds,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state != SeedListState::AwaitingRegisteredSeeds {
            debug!(state = %self.state, "Dropping stale seed listing");
            return;
        }

        match msg.0 {
            Ok(entries) => {
                let mut registered: HashMap<NodeAddress, String> = HashMap::new();
                for entry in entries {
                    if entry.value.is_empty() {
                        warn!(key = %entry.key, "Skipping seed entry with empty value");
                        continue;
                    }
                    registered.insert(NodeAddress::new(entry.value), entry.key);
                }

                // Queue the reconciliation deltas behind any deltas that
                // were stashed while the listing was in flight.
                let mut missing: Vec<_> = self
                    .current_seeds
                    .iter()
                    .filter(|member| !registered.contains_key(member))
                    .cloned()
                    .collect();
                missing.sort();
                let mut departed: Vec<_> = registered
                    .keys()
                    .filter(|member| !self.current_seeds.contains(member))
                    .cloned()
                    .collect();
                departed.sort();

                debug!(
                    registered = registered.len(),
                    to_add = missing.len(),
                    to_remove = departed.len(),
                    "Seed reconciliation plan"
                );

                for member in missing {
                    self.stash_command(SeedCommand::MemberAdded(member));
                }
                for member in departed {
                    self.stash_command(SeedCommand::MemberRemoved(member));
                }

                self.address_mapping = registered;
                self.state = SeedListState::AwaitingCommand;
                self.drain_stash(&ctx.actor_ref());
            }
            Err(StoreError::KeyNotFound) => {
                // Nothing registered yet; every current member needs an entry.
                debug!(
                    members = self.current_seeds.len(),
                    "Seed directory missing, registering all members"
                );
                let mut members: Vec<_> = self.current_seeds.iter().cloned().collect();
                members.sort();
                for member in members {
                    self.stash_command(SeedCommand::MemberAdded(member));
                }
                self.address_mapping.clear();
                self.state = SeedListState::AwaitingCommand;
                self.drain_stash(&ctx.actor_ref());
            }
            Err(e) => {
                warn!(error = %e, "Seed listing failed, retrying reconciliation");
                metrics::record_store_retry("list_dir");
                self.state = SeedListState::AwaitingInitialState;
                retry::tell_after(
                    ctx.actor_ref(),
                    InitialState(self.current_seeds.clone()),
                    self.config.etcd_retry_delay,
                );
            }
        }
    }
}

impl Message<MutationDone> for SeedListActor {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: MutationDone,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.state != SeedListState::AwaitingEtcdReply {
            debug!(state = %self.state, "Dropping stale mutation reply");
            return;
        }

        let Some(pending) = self.pending.take() else {
            warn!("Mutation reply with no pending command");
            self.state = SeedListState::AwaitingCommand;
            self.drain_stash(&ctx.actor_ref());
            return;
        };

        match (pending, msg.0) {
            (SeedCommand::MemberAdded(_), Ok(created)) => {
                // Record under the value the store echoed back; the
                // generated key is the only handle for a later delete.
                events::seed_registered(&created.value, &created.key);
                metrics::record_seed_created();
                self.address_mapping
                    .insert(NodeAddress::new(created.value), created.key);
            }
            (SeedCommand::MemberRemoved(_), Ok(prior)) => {
                events::seed_deregistered(&prior.value, &prior.key);
                metrics::record_seed_deleted();
                self.address_mapping.remove(&NodeAddress::new(prior.value));
            }
            (command, Err(e)) => {
                warn!(
                    member = %command.address(),
                    error = %e,
                    "Seed mutation failed, re-scheduling"
                );
                metrics::record_store_retry("seed_mutation");
                retry::tell_after(ctx.actor_ref(), command, self.config.etcd_retry_delay);
            }
        }

        self.state = SeedListState::AwaitingCommand;
        self.drain_stash(&ctx.actor_ref());
    }
}

impl Message<GetSeedListSnapshot> for SeedListActor {
    type Reply = SeedListSnapshot;

    async fn handle(
        &mut self,
        _msg: GetSeedListSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        SeedListSnapshot {
            state: self.state,
            current_seeds: self.current_seeds.clone(),
            address_mapping: self.address_mapping.clone(),
            stashed: self.stash.len(),
        }
    }
}
