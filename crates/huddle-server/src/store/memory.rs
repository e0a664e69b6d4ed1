//! In-Memory Store
//!
//! A [`KvStore`] with faithful etcd v2 directory semantics, used by the
//! test suite: real in-order child keys, distinct NodeExists/KeyNotFound/
//! TestFailed answers, TTL recording. Knobs allow injecting transport
//! failures and per-operation latency, and the store tracks how many
//! operations were ever in flight at once so tests can assert the
//! one-mutation-at-a-time invariant.

use super::{CasCondition, KeyValue, KvStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    dirs: HashSet<String>,
    entries: BTreeMap<String, String>,
    ttls: HashMap<String, Duration>,
    next_index: u64,
    skip_ops: usize,
    fail_next: usize,
    op_delay: Option<Duration>,
}

/// In-process [`KvStore`] for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct FlightGuard<'a> {
    store: &'a MemoryStore,
}

impl<'a> FlightGuard<'a> {
    fn enter(store: &'a MemoryStore) -> Self {
        let now = store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        store.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { store }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_after(0, n);
    }

    /// Let `skip` operations through, then fail the following `n` with a
    /// transport error.
    pub fn fail_after(&self, skip: usize, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.skip_ops = skip;
        inner.fail_next = n;
    }

    /// Add artificial latency to every operation.
    pub fn set_op_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().op_delay = Some(delay);
    }

    /// Highest number of operations ever concurrently in flight.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Current value of `key`, bypassing fault injection.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().entries.get(key).cloned()
    }

    /// Children of `dir`, sorted by key, bypassing fault injection.
    pub fn entries_under(&self, dir: &str) -> Vec<KeyValue> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    /// TTL recorded for `key`, if any.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.inner.lock().unwrap().ttls.get(key).copied()
    }

    /// Write an entry directly, simulating another node's activity.
    pub fn force_set(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .entries
            .insert(key.to_string(), value.to_string());
    }

    /// Remove an entry directly, simulating TTL expiry or another node's
    /// delete.
    pub fn force_remove(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key);
        inner.ttls.remove(key);
    }

    /// Mark a directory as existing without going through `create_dir`.
    pub fn force_dir(&self, key: &str) {
        self.inner.lock().unwrap().dirs.insert(key.to_string());
    }

    async fn begin(&self) -> Result<(), StoreError> {
        let delay = self.inner.lock().unwrap().op_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.skip_ops > 0 {
            inner.skip_ops -= 1;
        } else if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(StoreError::transport("injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn create_dir(&self, key: &str) -> Result<(), StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await?;

        let mut inner = self.inner.lock().unwrap();
        if inner.dirs.contains(key) || inner.entries.contains_key(key) {
            return Err(StoreError::NodeExists);
        }
        inner.dirs.insert(key.to_string());
        Ok(())
    }

    async fn list_dir(&self, key: &str) -> Result<Vec<KeyValue>, StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await?;

        if !self.inner.lock().unwrap().dirs.contains(key) {
            return Err(StoreError::KeyNotFound);
        }
        Ok(self.entries_under(key))
    }

    async fn create_in_order(&self, dir: &str, value: &str) -> Result<KeyValue, StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await?;

        let mut inner = self.inner.lock().unwrap();
        // POSTing to a missing directory creates it.
        inner.dirs.insert(dir.to_string());
        let index = inner.next_index;
        inner.next_index += 1;
        let key = format!("{}/{:020}", dir.trim_end_matches('/'), index);
        inner.entries.insert(key.clone(), value.to_string());
        Ok(KeyValue {
            key,
            value: value.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<KeyValue, StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await?;

        let mut inner = self.inner.lock().unwrap();
        inner.ttls.remove(key);
        match inner.entries.remove(key) {
            Some(value) => Ok(KeyValue {
                key: key.to_string(),
                value,
            }),
            None => Err(StoreError::KeyNotFound),
        }
    }

    async fn compare_and_set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        condition: CasCondition,
    ) -> Result<(), StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await?;

        let mut inner = self.inner.lock().unwrap();
        match condition {
            CasCondition::AbsentKey => {
                if inner.entries.contains_key(key) || inner.dirs.contains(key) {
                    return Err(StoreError::NodeExists);
                }
            }
            CasCondition::ValueEquals(prev) => match inner.entries.get(key) {
                None => return Err(StoreError::KeyNotFound),
                Some(current) if *current != prev => return Err(StoreError::TestFailed),
                Some(_) => {}
            },
        }

        inner.entries.insert(key.to_string(), value.to_string());
        match ttl {
            Some(ttl) => inner.ttls.insert(key.to_string(), ttl),
            None => inner.ttls.remove(key),
        };
        Ok(())
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let _guard = FlightGuard::enter(self);
        self.begin().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_dir_is_exclusive() {
        let store = MemoryStore::new();
        store.create_dir("/huddle").await.unwrap();
        assert!(matches!(
            store.create_dir("/huddle").await,
            Err(StoreError::NodeExists)
        ));
    }

    #[tokio::test]
    async fn list_dir_of_missing_directory_is_key_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.list_dir("/huddle/seeds").await,
            Err(StoreError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn in_order_keys_list_in_creation_order() {
        let store = MemoryStore::new();
        store.create_in_order("/huddle/seeds", "a").await.unwrap();
        store.create_in_order("/huddle/seeds", "b").await.unwrap();
        store.create_in_order("/huddle/seeds", "c").await.unwrap();

        let listed = store.list_dir("/huddle/seeds").await.unwrap();
        let values: Vec<_> = listed.iter().map(|kv| kv.value.as_str()).collect();
        assert_eq!(values, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn delete_returns_prior_node() {
        let store = MemoryStore::new();
        let created = store.create_in_order("/huddle/seeds", "a").await.unwrap();
        let prior = store.delete(&created.key).await.unwrap();
        assert_eq!(prior.value, "a");
        assert!(matches!(
            store.delete(&created.key).await,
            Err(StoreError::KeyNotFound)
        ));
    }

    #[tokio::test]
    async fn cas_absent_key_claims_once() {
        let store = MemoryStore::new();
        let ttl = Some(Duration::from_secs(15));
        store
            .compare_and_set("/huddle/leader", "a:1", ttl, CasCondition::AbsentKey)
            .await
            .unwrap();
        assert!(matches!(
            store
                .compare_and_set("/huddle/leader", "b:1", ttl, CasCondition::AbsentKey)
                .await,
            Err(StoreError::NodeExists)
        ));
        assert_eq!(store.ttl_of("/huddle/leader"), Some(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn cas_value_equals_distinguishes_missing_from_mismatch() {
        let store = MemoryStore::new();
        assert!(matches!(
            store
                .compare_and_set(
                    "/huddle/leader",
                    "a:1",
                    None,
                    CasCondition::ValueEquals("a:1".into())
                )
                .await,
            Err(StoreError::KeyNotFound)
        ));

        store.force_set("/huddle/leader", "b:1");
        assert!(matches!(
            store
                .compare_and_set(
                    "/huddle/leader",
                    "a:1",
                    None,
                    CasCondition::ValueEquals("a:1".into())
                )
                .await,
            Err(StoreError::TestFailed)
        ));
    }

    #[tokio::test]
    async fn injected_failures_hit_then_clear() {
        let store = MemoryStore::new();
        store.fail_next(1);
        assert!(matches!(
            store.create_dir("/huddle").await,
            Err(StoreError::Transport(_))
        ));
        store.create_dir("/huddle").await.unwrap();
    }
}
