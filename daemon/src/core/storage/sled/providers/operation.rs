use async_trait::async_trait;
use uuid::Uuid;

use tally_common::{config::ENTITY_OPERATION, ledger::Operation};

use crate::core::{
    error::LedgerError,
    storage::{
        sled::{decode, scoped, SledStorage},
        OperationProvider,
    },
};

#[async_trait]
impl OperationProvider for SledStorage {
    async fn create_operation(&self, operation: &Operation) -> Result<(), LedgerError> {
        let key = scoped(
            operation.organization_id,
            operation.ledger_id,
            operation.id.to_string(),
        );
        let row = serde_json::to_vec(operation)?;
        let claimed =
            self.operations
                .compare_and_swap(key, None as Option<&[u8]>, Some(row))?;
        if claimed.is_err() {
            return Err(LedgerError::EntityConflict { entity: ENTITY_OPERATION });
        }
        self.operations_by_transaction.insert(
            scoped(
                operation.organization_id,
                operation.ledger_id,
                format!("{}:{}", operation.transaction_id, operation.id),
            ),
            operation.id.to_string().into_bytes(),
        )?;
        Ok(())
    }

    async fn list_operations_by_transaction(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Vec<Operation>, LedgerError> {
        let prefix = scoped(organization_id, ledger_id, format!("{}:", transaction_id));
        let mut operations = Vec::new();
        for entry in self.operations_by_transaction.scan_prefix(prefix) {
            let (_, id_bytes) = entry?;
            let id = String::from_utf8_lossy(&id_bytes).to_string();
            let row = self
                .operations
                .get(scoped(organization_id, ledger_id, &id))?
                .ok_or(LedgerError::EntityNotFound { entity: ENTITY_OPERATION })?;
            operations.push(decode(&row)?);
        }
        Ok(operations)
    }
}
