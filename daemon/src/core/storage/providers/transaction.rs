use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::{Status, Transaction};

use crate::core::error::LedgerError;

#[async_trait]
pub trait TransactionProvider {
    // Store a new transaction header; a duplicate id surfaces as a
    // unique-constraint conflict the writer may tolerate
    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    async fn find_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, LedgerError>;

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    // The only status mutator; refuses transitions outside the DAG and
    // maps a missing row to EntityNotFound
    async fn update_transaction_status(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        status: Status,
    ) -> Result<Transaction, LedgerError>;
}
