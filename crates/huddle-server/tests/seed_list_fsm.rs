//! Seed-list state machine scenarios: reconciliation against pre-existing
//! entries, strict write serialization with ordered stash replay, retry
//! without losing deltas, and the membership round-trip.

use huddle_core::{DiscoveryConfig, NodeAddress};
use huddle_server::discovery::{
    GetSeedListSnapshot, InitialState, SeedCommand, SeedListActor, SeedListSnapshot,
    SeedListState,
};
use huddle_server::store::{KvStore, MemoryStore};
use kameo::actor::ActorRef;
use kameo::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(3);
const SEEDS: &str = "/huddle/seeds";

fn addr(s: &str) -> NodeAddress {
    NodeAddress::new(s)
}

fn members(addrs: &[&str]) -> HashSet<NodeAddress> {
    addrs.iter().map(|s| addr(s)).collect()
}

fn spawn_seed_list(store: Arc<MemoryStore>) -> ActorRef<SeedListActor> {
    let mut config = DiscoveryConfig::default();
    config.etcd_retry_delay = Duration::from_millis(100);
    let kv: Arc<dyn KvStore> = store;
    SeedListActor::spawn(SeedListActor::new(kv, Arc::new(config)))
}

async fn snapshot(actor: &ActorRef<SeedListActor>) -> SeedListSnapshot {
    actor
        .ask(GetSeedListSnapshot)
        .send()
        .await
        .expect("seed-list actor stopped")
}

/// Poll until the actor is idle in `AwaitingCommand` with nothing stashed
/// and `check` passes on its snapshot.
async fn wait_for_quiescence(
    actor: &ActorRef<SeedListActor>,
    check: impl Fn(&SeedListSnapshot) -> bool,
) -> SeedListSnapshot {
    let deadline = tokio::time::Instant::now() + SETTLE;
    loop {
        let snap = snapshot(actor).await;
        let idle =
            snap.state == SeedListState::AwaitingCommand && snap.stashed == 0 && check(&snap);
        if idle || tokio::time::Instant::now() >= deadline {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn seed_values(store: &MemoryStore) -> Vec<String> {
    let mut values: Vec<_> = store
        .entries_under(SEEDS)
        .into_iter()
        .map(|kv| kv.value)
        .collect();
    values.sort();
    values
}

#[tokio::test]
async fn reconciliation_adds_missing_and_removes_departed() {
    let store = Arc::new(MemoryStore::new());
    // The store already holds B and a stale C from a previous leader.
    let k1 = store.create_in_order(SEEDS, "b:9000").await.unwrap();
    store.create_in_order(SEEDS, "c:9000").await.unwrap();

    let actor = spawn_seed_list(store.clone());
    actor
        .tell(InitialState(members(&["a:9000", "b:9000"])))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 2).await;

    assert_eq!(seed_values(&store), ["a:9000", "b:9000"]);
    assert_eq!(snap.address_mapping.get(&addr("b:9000")), Some(&k1.key));
    let a_key = snap
        .address_mapping
        .get(&addr("a:9000"))
        .expect("a:9000 was never registered");
    assert_eq!(store.value_of(a_key), Some("a:9000".to_string()));
    assert!(!snap.address_mapping.contains_key(&addr("c:9000")));
}

#[tokio::test]
async fn missing_seed_directory_registers_every_member() {
    let store = Arc::new(MemoryStore::new());
    let actor = spawn_seed_list(store.clone());

    actor
        .tell(InitialState(members(&["a:9000", "b:9000"])))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 2).await;
    assert_eq!(seed_values(&store), ["a:9000", "b:9000"]);
    assert_eq!(snap.current_seeds, members(&["a:9000", "b:9000"]));
}

#[tokio::test]
async fn writes_are_serialized_and_stash_replays_in_order() {
    let store = Arc::new(MemoryStore::new());
    store.set_op_delay(Duration::from_millis(20));

    let actor = spawn_seed_list(store.clone());
    actor
        .tell(InitialState(members(&[])))
        .send()
        .await
        .unwrap();
    wait_for_quiescence(&actor, |_| true).await;

    // Burst while mutations are slow: everything past the first create
    // gets stashed and must replay in this order.
    actor
        .tell(SeedCommand::MemberAdded(addr("a:9000")))
        .send()
        .await
        .unwrap();
    actor
        .tell(SeedCommand::MemberAdded(addr("b:9000")))
        .send()
        .await
        .unwrap();
    actor
        .tell(SeedCommand::MemberRemoved(addr("a:9000")))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 1).await;

    assert_eq!(seed_values(&store), ["b:9000"]);
    assert!(snap.address_mapping.contains_key(&addr("b:9000")));
    // Strict serialization: never more than one store op in flight.
    assert_eq!(store.max_in_flight(), 1);
}

#[tokio::test]
async fn removal_of_unregistered_member_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let actor = spawn_seed_list(store.clone());
    actor.tell(InitialState(members(&[]))).send().await.unwrap();
    wait_for_quiescence(&actor, |_| true).await;

    actor
        .tell(SeedCommand::MemberRemoved(addr("x:9000")))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |_| true).await;
    assert_eq!(snap.state, SeedListState::AwaitingCommand);
    assert!(snap.address_mapping.is_empty());
    assert!(store.entries_under(SEEDS).is_empty());
}

#[tokio::test]
async fn failed_mutations_are_retried_without_losing_deltas() {
    let store = Arc::new(MemoryStore::new());
    let actor = spawn_seed_list(store.clone());
    actor.tell(InitialState(members(&[]))).send().await.unwrap();
    wait_for_quiescence(&actor, |_| true).await;

    // The store goes dark for the next few operations.
    store.fail_next(3);
    actor
        .tell(SeedCommand::MemberAdded(addr("a:9000")))
        .send()
        .await
        .unwrap();
    actor
        .tell(SeedCommand::MemberAdded(addr("b:9000")))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 2).await;
    assert_eq!(seed_values(&store), ["a:9000", "b:9000"]);
    assert_eq!(snap.current_seeds, members(&["a:9000", "b:9000"]));
}

#[tokio::test]
async fn listing_failure_restarts_reconciliation_and_keeps_stash() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next(1);

    let actor = spawn_seed_list(store.clone());
    actor
        .tell(InitialState(members(&["a:9000"])))
        .send()
        .await
        .unwrap();
    // Arrives while the (failing) listing is outstanding; must survive
    // the reconciliation retry.
    actor
        .tell(SeedCommand::MemberAdded(addr("b:9000")))
        .send()
        .await
        .unwrap();

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 2).await;
    assert_eq!(seed_values(&store), ["a:9000", "b:9000"]);
    assert_eq!(snap.current_seeds, members(&["a:9000", "b:9000"]));
}

#[tokio::test]
async fn seed_list_mirrors_net_membership_after_a_churn_sequence() {
    let store = Arc::new(MemoryStore::new());
    let actor = spawn_seed_list(store.clone());
    actor.tell(InitialState(members(&[]))).send().await.unwrap();
    wait_for_quiescence(&actor, |_| true).await;

    let churn = [
        SeedCommand::MemberAdded(addr("a:9000")),
        SeedCommand::MemberAdded(addr("b:9000")),
        SeedCommand::MemberRemoved(addr("a:9000")),
        SeedCommand::MemberAdded(addr("c:9000")),
        SeedCommand::MemberAdded(addr("a:9000")),
        SeedCommand::MemberRemoved(addr("b:9000")),
    ];
    for command in churn {
        actor.tell(command).send().await.unwrap();
    }

    let snap = wait_for_quiescence(&actor, |snap| snap.address_mapping.len() == 2).await;
    assert_eq!(seed_values(&store), ["a:9000", "c:9000"]);
    assert_eq!(snap.current_seeds, members(&["a:9000", "c:9000"]));
    assert_eq!(store.max_in_flight(), 1);
}
