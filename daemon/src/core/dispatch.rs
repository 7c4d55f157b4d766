//! Queue-driven execution with a synchronous fallback. The payload is
//! always parked on the KV backup queue first; the bus then either
//! carries it to a consumer or, failing that, the same executor runs
//! inline. Consumers re-enter the executor, which is idempotent.

use std::sync::Arc;

use log::{debug, warn};

use tally_common::{ledger::Transaction, queue::TransactionQueue};

use crate::{
    config::ServiceConfig,
    core::{bus::MessageBus, error::LedgerError, keys, kv::KvStore, writer::TransactionWriter},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Sync,
    Async,
}

pub struct AsyncDispatcher {
    kv: Arc<dyn KvStore>,
    bus: Arc<dyn MessageBus>,
    writer: Arc<TransactionWriter>,
    config: Arc<ServiceConfig>,
}

impl AsyncDispatcher {
    pub fn new(
        kv: Arc<dyn KvStore>,
        bus: Arc<dyn MessageBus>,
        writer: Arc<TransactionWriter>,
        config: Arc<ServiceConfig>,
    ) -> Self {
        Self { kv, bus, writer, config }
    }

    pub async fn execute(
        &self,
        mode: ExecutionMode,
        queue: TransactionQueue,
    ) -> Result<Transaction, LedgerError> {
        let payload = rmp_serde::to_vec_named(&queue)?;

        let backup_key = keys::backup_queue_key(
            queue.transaction.organization_id,
            queue.transaction.ledger_id,
        );
        if let Err(err) = self.kv.append(&backup_key, &payload).await {
            warn!("failed to park payload on the backup queue: {}", err);
        }

        match mode {
            ExecutionMode::Async => {
                match self
                    .bus
                    .publish(
                        &self.config.transaction_balance_operation_exchange,
                        &self.config.transaction_balance_operation_key,
                        &payload,
                    )
                    .await
                {
                    Ok(()) => {
                        debug!("transaction {} dispatched async", queue.transaction.id);
                        Ok(queue.transaction)
                    }
                    Err(err) => {
                        metrics::counter!("command.async_fallback").increment(1);
                        warn!(
                            "async dispatch of {} failed ({}), executing inline",
                            queue.transaction.id, err
                        );
                        self.run(queue).await
                    }
                }
            }
            ExecutionMode::Sync => self.run(queue).await,
        }
    }

    // Entry point for the queue consumer; the payload is exactly what
    // execute published
    pub async fn consume(&self, payload: &[u8]) -> Result<Transaction, LedgerError> {
        let queue: TransactionQueue = rmp_serde::from_slice(payload)?;
        self.run(queue).await
    }

    async fn run(&self, queue: TransactionQueue) -> Result<Transaction, LedgerError> {
        let TransactionQueue { validate, balances, transaction, parse_dsl } = queue;
        self.writer.execute(&validate, &balances, transaction, &parse_dsl).await
    }
}
