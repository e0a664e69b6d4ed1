//! Discovery Protocol
//!
//! Bootstrap for a cluster without a static seed list, rendezvousing
//! through the store:
//!
//! 1. Ensure the shared namespace directory exists
//! 2. Race for the leader key (compare-and-set with TTL)
//! 3. Winner: spawn seed-list maintenance, refresh the leader key on a
//!    timer, yield on any refresh failure
//! 4. Losers: fetch the published seed list and join through it
//!
//! Two actors cooperate: [`DiscoveryController`] owns the node lifecycle,
//! [`SeedListActor`] (leader-only child) mirrors membership into the
//! store's seed directory.

mod controller;
mod messages;
mod retry;
mod seed_list;

pub use controller::DiscoveryController;
pub use messages::{
    DiscoveryPhase, GetPhase, GetSeedListSnapshot, InitialState, SeedCommand, SeedListSnapshot,
    SeedListState, Shutdown, Start,
};
pub use seed_list::SeedListActor;
