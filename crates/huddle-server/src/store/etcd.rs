//! Etcd Store Backend
//!
//! Implements [`KvStore`] on top of etcd v3 primitives: transactions
//! comparing on create-revision or value stand in for the v2 `prevExist`
//! and `prevValue` conditions, leases carry the TTL, and directories are
//! a marker key plus a key prefix. Child keys for `create_in_order` are
//! generated client-side; the protocol only relies on their uniqueness
//! and on getting the generated key back.

use super::{CasCondition, KeyValue, KvStore, StoreError};
use anyhow::anyhow;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use etcd_client::{
    Client, Compare, CompareOp, DeleteOptions, GetOptions, PutOptions, SortOrder, SortTarget, Txn,
    TxnOp,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const CONNECT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(10);
const CONNECT_BACKOFF_MAX_ELAPSED: Duration = Duration::from_secs(60);
const CONNECT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// [`KvStore`] backed by an etcd cluster.
pub struct EtcdStore {
    client: Arc<RwLock<Client>>,
}

impl EtcdStore {
    /// Connect to etcd with exponential backoff.
    pub async fn connect(endpoints: &[String]) -> anyhow::Result<Self> {
        let backoff = ExponentialBackoff {
            initial_interval: CONNECT_BACKOFF_INITIAL,
            max_interval: CONNECT_BACKOFF_MAX,
            max_elapsed_time: Some(CONNECT_BACKOFF_MAX_ELAPSED),
            multiplier: CONNECT_BACKOFF_MULTIPLIER,
            ..Default::default()
        };

        let client = retry(backoff, || async {
            match Client::connect(endpoints, None).await {
                Ok(client) => {
                    debug!("Connected to etcd");
                    Ok(client)
                }
                Err(e) => {
                    warn!(error = %e, "etcd connection failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
        .map_err(|e| anyhow!("failed to connect to etcd after retries: {e}"))?;

        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    /// Wrap an already-connected client (used by embedding processes that
    /// share one connection).
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(RwLock::new(client)),
        }
    }

    fn transport(e: etcd_client::Error) -> StoreError {
        StoreError::Transport(anyhow::Error::new(e))
    }

    async fn grant_lease(&self, ttl: Duration) -> Result<i64, StoreError> {
        let mut client = self.client.write().await;
        let resp = client
            .lease_grant(ttl.as_secs().max(1) as i64, None)
            .await
            .map_err(Self::transport)?;
        Ok(resp.id())
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn create_dir(&self, key: &str) -> Result<(), StoreError> {
        let txn = Txn::new()
            .when(vec![Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, "", None)]);

        let mut client = self.client.write().await;
        let resp = client.txn(txn).await.map_err(Self::transport)?;
        if resp.succeeded() {
            Ok(())
        } else {
            Err(StoreError::NodeExists)
        }
    }

    async fn list_dir(&self, key: &str) -> Result<Vec<KeyValue>, StoreError> {
        let prefix = format!("{}/", key.trim_end_matches('/'));
        let options = GetOptions::new()
            .with_prefix()
            .with_sort(SortTarget::Key, SortOrder::Ascend);

        let mut client = self.client.write().await;
        let resp = client
            .get(prefix.as_str(), Some(options))
            .await
            .map_err(Self::transport)?;

        // A v3 prefix read cannot tell an absent directory from an empty
        // one; both surface as KeyNotFound, which the state machines treat
        // identically.
        if resp.kvs().is_empty() {
            return Err(StoreError::KeyNotFound);
        }

        let mut entries = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let key = kv.key_str().map_err(Self::transport)?;
            let value = kv.value_str().map_err(Self::transport)?;
            entries.push(KeyValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        Ok(entries)
    }

    async fn create_in_order(&self, dir: &str, value: &str) -> Result<KeyValue, StoreError> {
        let key = format!(
            "{}/{}",
            dir.trim_end_matches('/'),
            uuid::Uuid::new_v4().simple()
        );

        let mut client = self.client.write().await;
        client
            .put(key.as_str(), value, None)
            .await
            .map_err(Self::transport)?;

        Ok(KeyValue {
            key,
            value: value.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<KeyValue, StoreError> {
        let options = DeleteOptions::new().with_prev_key();

        let mut client = self.client.write().await;
        let resp = client
            .delete(key, Some(options))
            .await
            .map_err(Self::transport)?;

        match resp.prev_kvs().first() {
            Some(prev) => Ok(KeyValue {
                key: prev.key_str().map_err(Self::transport)?.to_string(),
                value: prev.value_str().map_err(Self::transport)?.to_string(),
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
        let lease_id = match ttl {
            Some(ttl) => Some(self.grant_lease(ttl).await?),
            None => None,
        };
        let put_options = lease_id.map(|id| PutOptions::new().with_lease(id));

        let compare = match &condition {
            CasCondition::AbsentKey => Compare::create_revision(key, CompareOp::Equal, 0),
            CasCondition::ValueEquals(prev) => Compare::value(key, CompareOp::Equal, prev.as_str()),
        };

        let txn = Txn::new()
            .when(vec![compare])
            .and_then(vec![TxnOp::put(key, value, put_options)]);

        let mut client = self.client.write().await;
        let resp = client.txn(txn).await.map_err(Self::transport)?;

        if resp.succeeded() {
            return Ok(());
        }

        // Condition failed; release the unused lease and report which
        // v2 error the failure corresponds to.
        if let Some(id) = lease_id {
            let _ = client.lease_revoke(id).await;
        }

        match condition {
            CasCondition::AbsentKey => Err(StoreError::NodeExists),
            CasCondition::ValueEquals(_) => {
                let current = client
                    .get(key, None)
                    .await
                    .map_err(Self::transport)?;
                if current.kvs().is_empty() {
                    Err(StoreError::KeyNotFound)
                } else {
                    Err(StoreError::TestFailed)
                }
            }
        }
    }

    async fn probe(&self) -> Result<(), StoreError> {
        let mut client = self.client.write().await;
        client.status().await.map_err(Self::transport)?;
        Ok(())
    }
}
