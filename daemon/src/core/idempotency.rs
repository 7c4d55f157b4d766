//! Request de-duplication with result memoization. The reservation is
//! the gate: exactly one caller per key performs the write, later
//! callers replay the memoized response verbatim.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use tally_common::ledger::Transaction;

use crate::core::{error::LedgerError, keys, kv::KvStore};

pub struct IdempotencyStore {
    kv: Arc<dyn KvStore>,
}

impl IdempotencyStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    // Reserve the key for this request. None means this caller is the
    // first and must perform the write. Some(response) means a finished
    // earlier request memoized its response; replay it verbatim. An
    // empty reservation means the first caller is still executing.
    pub async fn reserve(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        user_key: &str,
        hash: &str,
        ttl: Duration,
    ) -> Result<Option<String>, LedgerError> {
        let key = effective_key(user_key, hash);
        let kv_key = keys::idempotency_key(organization_id, ledger_id, key);
        if self.kv.set_nx(&kv_key, "", ttl).await? {
            return Ok(None);
        }
        match self.kv.get(&kv_key).await {
            Ok(memoized) if !memoized.is_empty() => Ok(Some(memoized)),
            Ok(_) => Err(LedgerError::IdempotencyKeyAlreadyInUse),
            // The reservation expired between set_nx and get; the
            // client retry will take the fresh slot
            Err(err) if err.is_not_found() => Err(LedgerError::IdempotencyKeyAlreadyInUse),
            Err(err) => Err(err.into()),
        }
    }

    // Memoize the response at the reserved key. Best-effort: the write
    // already happened and a lost memo only costs a replay.
    pub async fn memoize(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        user_key: &str,
        hash: &str,
        transaction: &Transaction,
        ttl: Duration,
    ) {
        let key = effective_key(user_key, hash);
        let kv_key = keys::idempotency_key(organization_id, ledger_id, key);
        let serialized = match serde_json::to_string(transaction) {
            Ok(serialized) => serialized,
            Err(err) => {
                warn!("failed to serialize idempotency memo for {}: {}", transaction.id, err);
                return;
            }
        };
        if let Err(err) = self.kv.set(&kv_key, &serialized, ttl).await {
            warn!("failed to memoize idempotency response for {}: {}", transaction.id, err);
        }
    }

    // Reverse mapping transaction id -> user key, so later lookups can
    // recover the key a transaction was created under. Best-effort.
    pub async fn map_reverse(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        user_key: &str,
        ttl: Duration,
    ) {
        let kv_key = keys::idempotency_reverse_key(organization_id, ledger_id, transaction_id);
        if let Err(err) = self.kv.set(&kv_key, user_key, ttl).await {
            warn!("failed to map transaction {} to its idempotency key: {}", transaction_id, err);
        }
    }
}

// An absent client key falls back to the request digest, so retries of
// the same payload still deduplicate
fn effective_key<'a>(user_key: &'a str, hash: &'a str) -> &'a str {
    if user_key.is_empty() {
        hash
    } else {
        user_key
    }
}
