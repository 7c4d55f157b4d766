//! Read-your-writes snapshot of a transaction in the KV store. Readers
//! serve from here while the durable store catches up; the snapshot
//! lives until the consumer confirms durability and deletes it. Cache
//! failures never block the main flow.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use tally_common::{dsl, ledger::Transaction};

use crate::core::{error::LedgerError, keys, kv::KvStore};

pub struct WriteBehindCache {
    kv: Arc<dyn KvStore>,
}

impl WriteBehindCache {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    // Snapshot the transaction with its parsed body attached so replays
    // never re-parse. No expiry: the consumer deletes explicitly.
    pub async fn store(&self, transaction: &Transaction, body: &dsl::Send) {
        let mut snapshot = transaction.clone();
        snapshot.body = Some(body.clone());
        self.write(&snapshot).await;
    }

    // Overwrite after a status change so readers observe the new state
    pub async fn update(&self, transaction: &Transaction) {
        self.write(transaction).await;
    }

    pub async fn delete(&self, organization_id: Uuid, ledger_id: Uuid, transaction_id: Uuid) {
        let key = keys::write_behind_key(organization_id, ledger_id, transaction_id);
        if let Err(err) = self.kv.del(&key).await {
            warn!("failed to drop write-behind snapshot {}: {}", transaction_id, err);
        }
    }

    // Read side used by the query path while the durable store lags
    pub async fn load(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        let key = keys::write_behind_key(organization_id, ledger_id, transaction_id);
        match self.kv.get_bytes(&key).await {
            Ok(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, snapshot: &Transaction) {
        let key = keys::write_behind_key(
            snapshot.organization_id,
            snapshot.ledger_id,
            snapshot.id,
        );
        let bytes = match rmp_serde::to_vec_named(snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("failed to encode write-behind snapshot {}: {}", snapshot.id, err);
                return;
            }
        };
        if let Err(err) = self.kv.set_bytes(&key, &bytes, Duration::ZERO).await {
            warn!("failed to store write-behind snapshot {}: {}", snapshot.id, err);
        }
    }
}
