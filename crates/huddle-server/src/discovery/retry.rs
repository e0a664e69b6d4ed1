//! Timer and Store-Call Plumbing
//!
//! The state machines never await a store call inside a message handler;
//! they spawn the call here and receive the result back as a message.
//! Timers are tokio tasks that deliver to the actor's mailbox: a delivery
//! to a stopped actor fails silently, and the periodic task exits on the
//! first failed delivery.

use crate::store::StoreError;
use kameo::actor::ActorRef;
use kameo::message::Message;
use kameo::Actor;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Deliver `msg` to `actor` once, after `delay`.
pub(crate) fn tell_after<A, M>(actor: ActorRef<A>, msg: M, delay: Duration) -> JoinHandle<()>
where
    A: Actor + Message<M>,
    M: Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = actor.tell(msg).send().await;
    })
}

/// Deliver `make()` to `actor` every `period`, skipping the immediate
/// first tick. Ends when the actor is gone.
pub(crate) fn tell_every<A, M, F>(actor: ActorRef<A>, period: Duration, make: F) -> JoinHandle<()>
where
    A: Actor + Message<M>,
    M: Send + 'static,
    F: Fn() -> M + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if actor.tell(make()).send().await.is_err() {
                break;
            }
        }
    })
}

/// Run `op` off the actor's turn and deliver `wrap(result)` back to it.
pub(crate) fn call_store<A, T, M, Fut, W>(actor: ActorRef<A>, op: Fut, wrap: W) -> JoinHandle<()>
where
    A: Actor + Message<M>,
    M: Send + 'static,
    T: Send + 'static,
    Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    W: FnOnce(Result<T, StoreError>) -> M + Send + 'static,
{
    tokio::spawn(async move {
        let result = op.await;
        let _ = actor.tell(wrap(result)).send().await;
    })
}
