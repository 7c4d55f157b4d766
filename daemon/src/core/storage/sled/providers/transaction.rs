use async_trait::async_trait;
use uuid::Uuid;

use tally_common::{
    config::ENTITY_TRANSACTION,
    ledger::{Status, Transaction},
    time,
};

use crate::core::{
    error::LedgerError,
    storage::{
        sled::{decode, scoped, SledStorage},
        TransactionProvider,
    },
};

#[async_trait]
impl TransactionProvider for SledStorage {
    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let key = scoped(
            transaction.organization_id,
            transaction.ledger_id,
            transaction.id.to_string(),
        );
        let row = serde_json::to_vec(transaction)?;
        let claimed =
            self.transactions
                .compare_and_swap(key, None as Option<&[u8]>, Some(row))?;
        if claimed.is_err() {
            return Err(LedgerError::EntityConflict { entity: ENTITY_TRANSACTION });
        }
        Ok(())
    }

    async fn find_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Transaction, LedgerError> {
        let row = self
            .transactions
            .get(scoped(organization_id, ledger_id, transaction_id.to_string()))?
            .ok_or(LedgerError::EntityNotFound { entity: ENTITY_TRANSACTION })?;
        decode(&row)
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let key = scoped(
            transaction.organization_id,
            transaction.ledger_id,
            transaction.id.to_string(),
        );
        if !self.transactions.contains_key(&key)? {
            return Err(LedgerError::EntityNotFound { entity: ENTITY_TRANSACTION });
        }
        self.transactions.insert(key, serde_json::to_vec(transaction)?)?;
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
        status: Status,
    ) -> Result<Transaction, LedgerError> {
        let mut transaction = self.find_transaction(organization_id, ledger_id, transaction_id).await?;
        if !transaction.status.code.can_transition_to(status.code) {
            return Err(LedgerError::InvalidStatusTransition {
                from: transaction.status.code.to_string(),
                to: status.code.to_string(),
            });
        }
        transaction.status = status;
        transaction.updated_at = time::now();
        self.update_transaction(&transaction).await?;
        Ok(transaction)
    }
}
