//! Synchronous end-to-end write path: persist the header, its metadata
//! and its legs, refresh the read-your-writes snapshot, and emit the
//! audit trail. Replays of the same payload are absorbed by the
//! duplicate tolerance on header and leg writes.

use std::sync::Arc;

use log::{info, warn};

use tally_common::{
    config::ENTITY_TRANSACTION,
    dsl,
    ledger::{validate_metadata, Balance, Transaction},
    queue::{QueueData, QueueMessage},
};

use crate::{
    config::ServiceConfig,
    core::{
        bus::MessageBus,
        docstore::MetadataStore,
        error::LedgerError,
        kv::KvStore,
        operations::OperationsBuilder,
        storage::LedgerStore,
        write_behind::WriteBehindCache,
    },
};

pub struct TransactionWriter {
    store: Arc<dyn LedgerStore>,
    metadata: Arc<dyn MetadataStore>,
    bus: Arc<dyn MessageBus>,
    config: Arc<ServiceConfig>,
    operations: OperationsBuilder,
    write_behind: WriteBehindCache,
}

impl TransactionWriter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        metadata: Arc<dyn MetadataStore>,
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self {
            operations: OperationsBuilder::new(Arc::clone(&store), Arc::clone(&metadata)),
            write_behind: WriteBehindCache::new(kv),
            store,
            metadata,
            bus,
            config,
        }
    }

    pub async fn execute(
        &self,
        validated: &dsl::Responses,
        balances: &[Balance],
        mut transaction: Transaction,
        send: &dsl::Send,
    ) -> Result<Transaction, LedgerError> {
        metrics::counter!("command.execute_transaction").increment(1);

        match self.store.create_transaction(&transaction).await {
            Ok(()) => {}
            // A concurrent consumer of the same payload owns the record
            Err(err) if err.is_unique_violation() => {
                info!("transaction {} already persisted", transaction.id);
            }
            Err(err) => return Err(err),
        }

        // Metadata is part of the write; its failure fails the request
        if let Some(metadata) = &transaction.metadata {
            validate_metadata(metadata)?;
            self.metadata
                .create_metadata(ENTITY_TRANSACTION, transaction.id, metadata)
                .await?;
        }

        // The request path builds the legs once so replays carry the
        // same operation ids; a payload without them is built here
        if transaction.operations.is_empty() {
            transaction.operations =
                OperationsBuilder::build_all(balances, &transaction, send, validated)?;
        }
        self.operations.persist_all(&transaction.operations).await?;

        self.write_behind.store(&transaction, send).await;

        if self.config.audit_enabled {
            self.publish_audit(&transaction).await?;
        }

        Ok(transaction)
    }

    // One audit entry per operation. A single bad operation is dropped
    // with a log line; all of them failing to serialize means a blind
    // audit trail and surfaces.
    async fn publish_audit(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        if transaction.operations.is_empty() {
            return Ok(());
        }

        let mut queue_data = Vec::with_capacity(transaction.operations.len());
        for operation in &transaction.operations {
            match serde_json::to_vec(operation) {
                Ok(value) => queue_data.push(QueueData { id: operation.id, value }),
                Err(err) => warn!("failed to serialize audit entry {}: {}", operation.id, err),
            }
        }
        if queue_data.is_empty() {
            return Err(LedgerError::AuditPayloadUnserializable {
                transaction_id: transaction.id,
            });
        }

        let envelope = QueueMessage {
            organization_id: transaction.organization_id,
            ledger_id: transaction.ledger_id,
            account_id: None,
            audit_id: Some(transaction.id),
            queue_data,
        };
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to serialize audit envelope for {}: {}", transaction.id, err);
                return Ok(());
            }
        };

        // The primary write is authoritative; a lost audit message is
        // logged, not surfaced
        if let Err(err) = self
            .bus
            .publish(&self.config.audit_exchange, &self.config.audit_key, &payload)
            .await
        {
            warn!("audit publish for {} failed: {}", transaction.id, err);
        }
        Ok(())
    }
}
