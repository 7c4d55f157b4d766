mod memory;

pub use memory::MemoryKvStore;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::Balance;

use crate::core::{error::KvError, keys};

// Typed operations over the in-memory KV store. A zero TTL means the
// entry never expires on its own.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    // Atomic create-if-absent; true when this caller created the entry
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn set_bytes(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), KvError>;

    // Missing keys surface as KvError::KeyNotFound
    async fn get(&self, key: &str) -> Result<String, KvError>;

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, KvError>;

    async fn del(&self, key: &str) -> Result<(), KvError>;

    // Append one payload to the list at key (the backup queue)
    async fn append(&self, key: &str, bytes: &[u8]) -> Result<(), KvError>;

    // Take and clear every payload appended at key
    async fn drain(&self, key: &str) -> Result<Vec<Vec<u8>>, KvError>;

    // Fast path for "is this balance currently in flight?": a cached
    // snapshot exists while a transaction that touched it is recent
    async fn list_balance_by_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        composite: &str,
    ) -> Result<Option<Balance>, KvError> {
        let key = keys::balance_cache_key(organization_id, ledger_id, composite);
        match self.get_bytes(&key).await {
            Ok(bytes) => {
                let balance =
                    rmp_serde::from_slice(&bytes).map_err(|e| KvError::Codec(e.to_string()))?;
                Ok(Some(balance))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn cache_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance: &Balance,
        ttl: Duration,
    ) -> Result<(), KvError> {
        let key = keys::balance_cache_key(organization_id, ledger_id, &balance.composite_key());
        let bytes = rmp_serde::to_vec_named(balance).map_err(|e| KvError::Codec(e.to_string()))?;
        self.set_bytes(&key, &bytes, ttl).await
    }

    async fn evict_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        composite: &str,
    ) -> Result<(), KvError> {
        self.del(&keys::balance_cache_key(organization_id, ledger_id, composite)).await
    }
}
