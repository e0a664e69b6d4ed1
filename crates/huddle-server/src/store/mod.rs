//! Key-Value Store Abstraction
//!
//! The discovery protocol only needs five operations with etcd v2
//! directory semantics: ensure a directory, list it, append a
//! uniquely-keyed child, delete a key, and conditional writes with a TTL.
//! [`EtcdStore`] provides them over etcd v3 primitives; [`MemoryStore`]
//! provides them in-process for the test suite.

mod error;
pub mod etcd;
pub mod memory;

pub use error::StoreError;
pub use etcd::EtcdStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;

/// A key together with its stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Condition guarding a [`KvStore::compare_and_set`] write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasCondition {
    /// The key must not exist yet (`prevExist=false`). Fails with
    /// [`StoreError::NodeExists`] otherwise.
    AbsentKey,

    /// The key must currently hold exactly this value (`prevValue`).
    /// Fails with [`StoreError::TestFailed`] on mismatch and
    /// [`StoreError::KeyNotFound`] if the key is gone.
    ValueEquals(String),
}

/// Client for the external rendezvous store.
///
/// All operations are idempotent or conditional; the state machines never
/// need anything stronger than compare-and-swap. Implementations must be
/// safe for concurrent use from both state machines.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Ensure `key` exists as a directory. Returns
    /// [`StoreError::NodeExists`] if it already does.
    async fn create_dir(&self, key: &str) -> Result<(), StoreError>;

    /// List the direct children of directory `key`, sorted by key.
    /// Returns [`StoreError::KeyNotFound`] if the directory does not
    /// exist.
    async fn list_dir(&self, key: &str) -> Result<Vec<KeyValue>, StoreError>;

    /// Create a child of directory `dir` under a generated unique key and
    /// return it. The caller must record the returned key; it is the only
    /// handle for a later delete.
    async fn create_in_order(&self, dir: &str, value: &str) -> Result<KeyValue, StoreError>;

    /// Delete `key` and return the node it previously held.
    async fn delete(&self, key: &str) -> Result<KeyValue, StoreError>;

    /// Atomically write `value` to `key` when `condition` holds,
    /// attaching a lease of `ttl` if given.
    async fn compare_and_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        condition: CasCondition,
    ) -> Result<(), StoreError>;

    /// Cheap connectivity probe for liveness checks.
    async fn probe(&self) -> Result<(), StoreError>;
}
