use async_trait::async_trait;
use uuid::Uuid;

use tally_common::{dsl::Responses, ledger::Balance};

use crate::core::error::LedgerError;

#[async_trait]
pub trait BalanceProvider {
    // Insert a new balance; (account_id, key) is unique and a duplicate
    // surfaces as a unique-constraint conflict
    async fn create_balance(&self, balance: &Balance) -> Result<(), LedgerError>;

    async fn find_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<Balance, LedgerError>;

    async fn find_balance_by_account_id_and_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        key: &str,
    ) -> Result<Balance, LedgerError>;

    async fn exists_balance_by_account_id_and_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        key: &str,
    ) -> Result<bool, LedgerError>;

    async fn list_balances_by_account_id(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Balance>, LedgerError>;

    // Resolve the balances participating in a movement. Each target is a
    // balance id, a bare alias (the default balance), or "alias#key".
    // Every target must resolve or the lookup fails.
    async fn list_balances_by_targets(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        targets: &[String],
    ) -> Result<Vec<Balance>, LedgerError>;

    // The optimistic-concurrency mutation point. Applies the validated
    // deltas to the given balances in one all-or-nothing batch; every
    // row write is conditional on the version carried by its input
    // balance and bumps it. Any version mismatch aborts the whole batch
    // with a retryable conflict.
    async fn balances_update(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balances: &[Balance],
        validated: &Responses,
    ) -> Result<Vec<Balance>, LedgerError>;

    // Flip the transfer-permission flags on every balance of an account
    async fn update_all_balances_by_account_id(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        allow_sending: bool,
        allow_receiving: bool,
    ) -> Result<(), LedgerError>;

    async fn delete_balances_by_ids(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_ids: &[Uuid],
    ) -> Result<(), LedgerError>;

    async fn delete_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<(), LedgerError>;

    // Upsert the row iff the given snapshot is strictly newer than the
    // stored one; false means the store was already at or ahead
    async fn upsert_balance_if_newer(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance: &Balance,
    ) -> Result<bool, LedgerError>;
}
