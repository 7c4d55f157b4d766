//! Turns validated DSL legs into per-balance operation records.
//! Building is pure and happens once per request, so replayed payloads
//! carry the same operation ids and land on the duplicate tolerance.
//! Persisting attempts every leg even after a failure and reports the
//! first error.

use std::sync::Arc;

use log::warn;
use uuid::Uuid;

use tally_common::{
    config::{ENTITY_BALANCE, ENTITY_OPERATION},
    dsl::{self, FromTo},
    ledger::{
        validate_metadata, Balance, Operation, OperationAmount, OperationBalance, OperationKind,
        Transaction,
    },
    time,
};

use crate::core::{docstore::MetadataStore, error::LedgerError, storage::LedgerStore};

pub struct OperationsBuilder {
    store: Arc<dyn LedgerStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl OperationsBuilder {
    pub fn new(store: Arc<dyn LedgerStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { store, metadata }
    }

    // One operation per leg, debit legs first. The balances are the
    // pre-mutation snapshots; the after-image comes from the validated
    // deltas, never from re-reading the store.
    pub fn build_all(
        balances: &[Balance],
        transaction: &Transaction,
        send: &dsl::Send,
        validated: &dsl::Responses,
    ) -> Result<Vec<Operation>, LedgerError> {
        let legs = send
            .source
            .from
            .iter()
            .map(|leg| (leg, OperationKind::Debit))
            .chain(send.distribute.to.iter().map(|leg| (leg, OperationKind::Credit)));

        let mut operations = Vec::new();
        for (leg, kind) in legs {
            operations.push(build_leg(balances, transaction, send, validated, leg, kind)?);
        }
        Ok(operations)
    }

    pub async fn persist_all(&self, operations: &[Operation]) -> Result<(), LedgerError> {
        let mut first_error: Option<LedgerError> = None;
        for operation in operations {
            if let Err(err) = self.persist_one(operation).await {
                warn!(
                    "failed to persist {:?} leg {} of transaction {}: {}",
                    operation.kind, operation.id, operation.transaction_id, err
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn persist_one(&self, operation: &Operation) -> Result<(), LedgerError> {
        match self.store.create_operation(operation).await {
            Ok(()) => {}
            // A replayed payload already wrote this leg
            Err(err) if err.is_unique_violation() => {
                warn!("operation {} already persisted", operation.id);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        if let Some(metadata) = &operation.metadata {
            validate_metadata(metadata)?;
            self.metadata
                .create_metadata(ENTITY_OPERATION, operation.id, metadata)
                .await?;
        }
        Ok(())
    }
}

fn build_leg(
    balances: &[Balance],
    transaction: &Transaction,
    send: &dsl::Send,
    validated: &dsl::Responses,
    leg: &FromTo,
    kind: OperationKind,
) -> Result<Operation, LedgerError> {
    let target = leg.target_key();
    let balance = balances
        .iter()
        .find(|balance| balance.matches_target(&target))
        .ok_or(LedgerError::EntityNotFound { entity: ENTITY_BALANCE })?;

    let amount = match kind {
        OperationKind::Debit => validated.from.get(&target),
        _ => validated.to.get(&target),
    }
    .ok_or(LedgerError::EntityNotFound { entity: ENTITY_BALANCE })?;

    let before = OperationBalance {
        available: balance.available,
        on_hold: balance.on_hold,
        version: balance.version,
    };
    let after = OperationBalance {
        available: match kind {
            OperationKind::Debit => balance.available - amount.value,
            _ => balance.available + amount.value,
        },
        on_hold: balance.on_hold,
        version: balance.version + 1,
    };

    let description = leg
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| send.description.clone())
        .unwrap_or_default();

    let now = time::now();
    Ok(Operation {
        id: Uuid::now_v7(),
        transaction_id: transaction.id,
        organization_id: transaction.organization_id,
        ledger_id: transaction.ledger_id,
        kind,
        asset_code: amount.asset.clone(),
        amount: OperationAmount { asset: amount.asset.clone(), value: amount.value },
        balance: before,
        balance_after: after,
        balance_id: balance.id,
        account_id: balance.account_id,
        account_alias: balance.alias.clone(),
        balance_key: balance.key.clone(),
        description,
        chart_of_accounts: leg.chart_of_accounts.clone().unwrap_or_default(),
        metadata: leg.metadata.clone(),
        created_at: now,
        updated_at: now,
    })
}
