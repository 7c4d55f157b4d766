use async_trait::async_trait;
use uuid::Uuid;

use tally_common::ledger::Operation;

use crate::core::error::LedgerError;

#[async_trait]
pub trait OperationProvider {
    // Operations are immutable once persisted; duplicates surface as a
    // unique-constraint conflict tolerated by the replay paths
    async fn create_operation(&self, operation: &Operation) -> Result<(), LedgerError>;

    async fn list_operations_by_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Vec<Operation>, LedgerError>;
}
