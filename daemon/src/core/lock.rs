//! Per-alias fair locks over the KV store. At most one writer mutates
//! the balances of an alias at a time; liveness under contention comes
//! from the back-off loop and the lock lifetime ceiling.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, warn};
use sha3::{Digest, Sha3_256};
use tokio::time::sleep;
use uuid::Uuid;

use tally_common::config::{LOCK_RETRY_BACKOFF, TIME_SET_LOCK};

use crate::core::{
    error::LedgerError,
    keys,
    kv::KvStore,
    storage::LedgerStore,
};

// Deterministic digest of a request. Locks are released only by their
// owner, and hash-derived idempotency keys reuse the same digest.
pub fn request_hash(organization_id: Uuid, ledger_id: Uuid, body: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(organization_id.as_bytes());
    hasher.update(ledger_id.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

pub struct LockManager {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn LedgerStore>,
}

impl LockManager {
    pub fn new(kv: Arc<dyn KvStore>, store: Arc<dyn LedgerStore>) -> Self {
        Self { kv, store }
    }

    // Acquire every alias concurrently and wait for all of them. The
    // first hard error wins; contended aliases keep retrying with
    // back-off until the lifetime ceiling bounds the wait.
    pub async fn acquire_all(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        aliases: &[String],
        owner_hash: &str,
    ) -> Result<(), LedgerError> {
        let attempts = aliases.iter().map(|alias| {
            let kv = Arc::clone(&self.kv);
            let alias = alias.clone();
            let owner_hash = owner_hash.to_string();
            async move {
                let key = keys::lock_key(organization_id, ledger_id, &alias);
                let started = Instant::now();
                loop {
                    if kv.set_nx(&key, &owner_hash, TIME_SET_LOCK).await? {
                        debug!("lock acquired on {}", alias);
                        return Ok(());
                    }
                    if started.elapsed() >= TIME_SET_LOCK {
                        return Err(LedgerError::LockAcquisitionTimeout { alias });
                    }
                    sleep(LOCK_RETRY_BACKOFF).await;
                }
            }
        });

        // barrier: every worker finishes before the first error surfaces
        let results: Vec<Result<(), LedgerError>> = join_all(attempts).await;
        results.into_iter().collect()
    }

    // Best-effort release. Only entries still carrying our owner hash
    // are deleted; anything else belongs to a later writer. Failures
    // are logged and left to the lifetime ceiling.
    pub async fn release_all(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        aliases: &[String],
        owner_hash: &str,
    ) {
        for alias in aliases {
            let key = keys::lock_key(organization_id, ledger_id, alias);
            match self.kv.get(&key).await {
                Ok(value) if value == owner_hash => {
                    if let Err(err) = self.kv.del(&key).await {
                        warn!("failed to release lock on {}: {}", alias, err);
                    }
                }
                Ok(_) => warn!("lock on {} is owned by another writer, leaving it", alias),
                Err(err) if err.is_not_found() => {}
                Err(err) => warn!("failed to read lock on {}: {}", alias, err),
            }
        }
    }

    // Flip the transfer-permission flags on all balances of an account.
    // Balance deletion freezes the account this way and rolls the flags
    // back if the delete fails.
    pub async fn toggle_transfers(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        allow: bool,
    ) -> Result<(), LedgerError> {
        self.store
            .update_all_balances_by_account_id(organization_id, ledger_id, account_id, allow, allow)
            .await
    }
}
