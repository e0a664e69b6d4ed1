//! Discovery Controller
//!
//! Drives one node through cluster bootstrap against the rendezvous
//! store: ensure the shared namespace, contend for the leader key, then
//! either lead (spawning the seed-list actor and refreshing the leader
//! key on a timer) or follow (joining via the published seed list).
//!
//! Store calls never block a handler; replies come back as messages and
//! are matched against the phase that issued them. A transiently failed
//! operation re-schedules its triggering message after the retry delay,
//! so every phase is re-entered through the same door it was first
//! entered by.

use super::messages::{
    ClusterEventMsg, DiscoveryPhase, ElectionOutcome, FetchSeeds, GetPhase, InitialState,
    NamespaceReady, RefreshOutcome, RefreshTick, RunElection, SeedCommand, SeedsFetched, Shutdown,
    Start,
};
use super::retry;
use super::seed_list::SeedListActor;
use crate::cluster::{ClusterEvent, Membership};
use crate::observability::{events, metrics};
use crate::store::{CasCondition, KvStore, StoreError};
use huddle_core::{DiscoveryConfig, NodeAddress};
use kameo::actor::ActorRef;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Actor owning the node-level bootstrap state machine.
#[derive(Actor)]
pub struct DiscoveryController {
    config: Arc<DiscoveryConfig>,
    store: Arc<dyn KvStore>,
    cluster: Arc<dyn Membership>,
    phase: DiscoveryPhase,
    phase_tx: watch::Sender<DiscoveryPhase>,
    /// Set iff phase == Leader.
    seed_list: Option<ActorRef<SeedListActor>>,
    /// Periodic leader-key refresh; aborted on demotion.
    refresh_task: Option<JoinHandle<()>>,
    /// Forwards membership events into this actor's mailbox.
    events_task: Option<JoinHandle<()>>,
}

impl DiscoveryController {
    /// Build the controller and the phase channel observers subscribe to.
    pub fn new(
        config: Arc<DiscoveryConfig>,
        store: Arc<dyn KvStore>,
        cluster: Arc<dyn Membership>,
    ) -> (Self, watch::Receiver<DiscoveryPhase>) {
        let (phase_tx, phase_rx) = watch::channel(DiscoveryPhase::Initial);
        (
            Self {
                config,
                store,
                cluster,
                phase: DiscoveryPhase::Initial,
                phase_tx,
                seed_list: None,
                refresh_task: None,
                events_task: None,
            },
            phase_rx,
        )
    }

    fn self_address(&self) -> NodeAddress {
        self.cluster.self_address()
    }

    fn set_phase(&mut self, next: DiscoveryPhase) {
        if self.phase != next {
            info!(from = %self.phase, to = %next, "Discovery phase change");
            self.phase = next;
            let _ = self.phase_tx.send(next);
        }
    }

    /// Place a leader-key claim; the reply arrives as [`ElectionOutcome`].
    fn bid_for_leadership(&self, actor: ActorRef<Self>) {
        let store = self.store.clone();
        let config = self.config.clone();
        let addr = self.self_address();
        retry::call_store(
            actor,
            async move {
                store
                    .compare_and_set(
                        &config.leader_path,
                        addr.as_str(),
                        Some(config.leader_entry_ttl),
                        CasCondition::AbsentKey,
                    )
                    .await
            },
            ElectionOutcome,
        );
    }

    /// Fetch the published seed list; the reply arrives as [`SeedsFetched`].
    fn fetch_seeds(&self, actor: ActorRef<Self>) {
        let store = self.store.clone();
        let dir = self.config.seeds_path.clone();
        let fetch_timeout = self.config.seeds_fetch_timeout;
        retry::call_store(
            actor,
            async move {
                match tokio::time::timeout(fetch_timeout, store.list_dir(&dir)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::transport("seed fetch timed out")),
                }
            },
            SeedsFetched,
        );
    }

    async fn become_leader(&mut self, actor: ActorRef<Self>) {
        self.set_phase(DiscoveryPhase::Leader);
        let addr = self.self_address();
        events::leader_elected(addr.as_str());
        metrics::record_election_won();

        let snapshot = self.cluster.members().await;
        let seed_list = SeedListActor::spawn(SeedListActor::new(
            self.store.clone(),
            self.config.clone(),
        ));
        let _ = seed_list.tell(InitialState(snapshot)).send().await;
        self.seed_list = Some(seed_list);

        self.refresh_task = Some(retry::tell_every(
            actor,
            self.config.leader_refresh_interval,
            || RefreshTick,
        ));
    }

    /// Leave the Leader phase: cancel the refresh timer and terminate the
    /// seed-list child. In-flight replies addressed to the child are
    /// discarded by its closed mailbox.
    async fn demote(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        if let Some(seed_list) = self.seed_list.take() {
            seed_list.stop_gracefully().await.ok();
        }
    }
}

impl Message<Start> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: Start,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.events_task.is_none() {
            let mut rx = self.cluster.subscribe();
            let actor = ctx.actor_ref();
            self.events_task = Some(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            if actor.tell(ClusterEventMsg(event)).send().await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "Membership event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        if self.phase != DiscoveryPhase::Initial {
            debug!(phase = %self.phase, "Bootstrap already started");
            return;
        }

        info!(
            node = %self.self_address(),
            etcd_path = %self.config.etcd_path,
            "Starting cluster bootstrap"
        );
        let store = self.store.clone();
        let path = self.config.etcd_path.clone();
        retry::call_store(
            ctx.actor_ref(),
            async move { store.create_dir(&path).await },
            NamespaceReady,
        );
    }
}

impl Message<NamespaceReady> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: NamespaceReady,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::Initial {
            debug!(phase = %self.phase, "Dropping stale namespace reply");
            return;
        }

        match msg.0 {
            // An already-present namespace is the common case on restart.
            Ok(()) | Err(StoreError::NodeExists) => {
                self.set_phase(DiscoveryPhase::Election);
                self.bid_for_leadership(ctx.actor_ref());
            }
            Err(e) => {
                warn!(error = %e, "Namespace init failed, retrying");
                metrics::record_store_retry("create_dir");
                retry::tell_after(ctx.actor_ref(), Start, self.config.etcd_retry_delay);
            }
        }
    }
}

impl Message<RunElection> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: RunElection,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        // Delivered by retry timers from Election itself and by dead-end
        // seed fetches; any other phase means the race already resolved.
        match self.phase {
            DiscoveryPhase::Election | DiscoveryPhase::AwaitingSeedsFetch => {
                self.set_phase(DiscoveryPhase::Election);
                self.bid_for_leadership(ctx.actor_ref());
            }
            phase => debug!(phase = %phase, "Dropping stale election trigger"),
        }
    }
}

impl Message<ElectionOutcome> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ElectionOutcome,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::Election {
            debug!(phase = %self.phase, "Dropping stale election outcome");
            return;
        }

        match msg.0 {
            Ok(()) => {
                self.become_leader(ctx.actor_ref()).await;
            }
            Err(StoreError::NodeExists) => {
                // Another node holds the leader key; follow it.
                debug!("Election lost, fetching seed list");
                self.set_phase(DiscoveryPhase::AwaitingSeedsFetch);
                self.fetch_seeds(ctx.actor_ref());
            }
            Err(e) => {
                warn!(error = %e, "Election bid failed, retrying");
                metrics::record_store_retry("election");
                retry::tell_after(ctx.actor_ref(), RunElection, self.config.etcd_retry_delay);
            }
        }
    }
}

impl Message<RefreshTick> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: RefreshTick,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::Leader {
            debug!(phase = %self.phase, "Dropping refresh tick outside Leader");
            return;
        }

        let store = self.store.clone();
        let config = self.config.clone();
        let addr = self.self_address();
        retry::call_store(
            ctx.actor_ref(),
            async move {
                store
                    .compare_and_set(
                        &config.leader_path,
                        addr.as_str(),
                        Some(config.leader_entry_ttl),
                        CasCondition::ValueEquals(addr.as_str().to_string()),
                    )
                    .await
            },
            RefreshOutcome,
        );
    }
}

impl Message<RefreshOutcome> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: RefreshOutcome,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::Leader {
            debug!(phase = %self.phase, "Dropping stale refresh outcome");
            return;
        }

        match msg.0 {
            Ok(()) => trace!("Leader key refreshed"),
            // Holding leadership locally without confirming it in the
            // store risks a second leader on lease expiry, so any refresh
            // failure yields and re-contends.
            Err(e) => {
                warn!(error = %e, "Leader key refresh failed, yielding leadership");
                events::leadership_lost(self.self_address().as_str(), &e.to_string());
                metrics::record_leadership_lost();
                self.demote().await;
                self.set_phase(DiscoveryPhase::Election);
                self.bid_for_leadership(ctx.actor_ref());
            }
        }
    }
}

impl Message<FetchSeeds> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: FetchSeeds,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::AwaitingSeedsFetch {
            debug!(phase = %self.phase, "Dropping stale seed-fetch trigger");
            return;
        }
        self.fetch_seeds(ctx.actor_ref());
    }
}

impl Message<SeedsFetched> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: SeedsFetched,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if self.phase != DiscoveryPhase::AwaitingSeedsFetch {
            debug!(phase = %self.phase, "Dropping stale seed listing");
            return;
        }

        match msg.0 {
            Ok(entries) => {
                let seeds: Vec<NodeAddress> = entries
                    .into_iter()
                    .filter(|kv| !kv.value.is_empty())
                    .map(|kv| NodeAddress::new(kv.value))
                    .collect();

                if seeds.is_empty() {
                    // The prior leader registered no seeds; re-contend.
                    debug!("Seed list empty, re-entering election");
                    retry::tell_after(
                        ctx.actor_ref(),
                        RunElection,
                        self.config.election_retry_delay,
                    );
                    return;
                }

                info!(seed_count = seeds.len(), "Joining cluster via published seeds");
                self.set_phase(DiscoveryPhase::JoiningCluster);
                if let Err(e) = self.cluster.join(seeds).await {
                    warn!(error = %e, "Join request failed, refetching seeds");
                    self.set_phase(DiscoveryPhase::AwaitingSeedsFetch);
                    retry::tell_after(ctx.actor_ref(), FetchSeeds, self.config.etcd_retry_delay);
                }
            }
            Err(StoreError::KeyNotFound) => {
                debug!("No seed directory yet, re-entering election");
                retry::tell_after(
                    ctx.actor_ref(),
                    RunElection,
                    self.config.election_retry_delay,
                );
            }
            Err(e) => {
                warn!(error = %e, "Seed fetch failed, retrying");
                metrics::record_store_retry("seed_fetch");
                retry::tell_after(ctx.actor_ref(), FetchSeeds, self.config.etcd_retry_delay);
            }
        }
    }
}

impl Message<ClusterEventMsg> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ClusterEventMsg,
        ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match msg.0 {
            ClusterEvent::MemberUp(addr) => {
                if self.phase == DiscoveryPhase::Leader {
                    if let Some(seed_list) = &self.seed_list {
                        let _ = seed_list
                            .tell(SeedCommand::MemberAdded(addr))
                            .send()
                            .await;
                    }
                } else if self.phase == DiscoveryPhase::JoiningCluster
                    && addr == self.self_address()
                {
                    events::cluster_joined(addr.as_str());
                    self.set_phase(DiscoveryPhase::Follower);
                }
            }
            ClusterEvent::MemberRemoved(addr) => {
                if self.phase == DiscoveryPhase::Leader {
                    if let Some(seed_list) = &self.seed_list {
                        let _ = seed_list
                            .tell(SeedCommand::MemberRemoved(addr))
                            .send()
                            .await;
                    }
                }
            }
            ClusterEvent::LeaderChanged(hint) => {
                if self.phase != DiscoveryPhase::Follower {
                    debug!(phase = %self.phase, hint = ?hint, "Ignoring leader hint");
                    return;
                }
                match hint {
                    // The gossip layer proposes this node: our earlier bid
                    // may have succeeded without the reply reaching us.
                    Some(addr) if addr == self.self_address() => {
                        info!("Gossip points at this node, re-entering election");
                        self.set_phase(DiscoveryPhase::Election);
                        self.bid_for_leadership(ctx.actor_ref());
                    }
                    None => {
                        info!("Cluster leader gone, re-entering election");
                        self.set_phase(DiscoveryPhase::Election);
                        self.bid_for_leadership(ctx.actor_ref());
                    }
                    Some(other) => {
                        debug!(leader = %other, "Cluster leader changed");
                    }
                }
            }
        }
    }
}

impl Message<GetPhase> for DiscoveryController {
    type Reply = DiscoveryPhase;

    async fn handle(
        &mut self,
        _msg: GetPhase,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.phase
    }
}

impl Message<Shutdown> for DiscoveryController {
    type Reply = ();

    async fn handle(
        &mut self,
        _msg: Shutdown,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        info!("Discovery shutting down");
        self.demote().await;
        if let Some(task) = self.events_task.take() {
            task.abort();
        }
    }
}
