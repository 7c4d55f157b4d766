use async_trait::async_trait;
use log::trace;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use uuid::Uuid;

use tally_common::{
    config::{DEFAULT_BALANCE_KEY, ENTITY_BALANCE},
    dsl::Responses,
    ledger::Balance,
    time,
};

use crate::core::{
    balance::apply_validated_deltas,
    error::LedgerError,
    storage::{
        sled::{decode, scoped, SledStorage},
        BalanceProvider,
    },
};

impl SledStorage {
    fn load_balance(&self, organization_id: Uuid, ledger_id: Uuid, id_bytes: &[u8]) -> Result<Balance, LedgerError> {
        let id = String::from_utf8_lossy(id_bytes).to_string();
        let row = self
            .balances
            .get(scoped(organization_id, ledger_id, &id))?
            .ok_or(LedgerError::EntityNotFound { entity: ENTITY_BALANCE })?;
        decode(&row)
    }

    fn account_index_key(balance: &Balance) -> Vec<u8> {
        scoped(
            balance.organization_id,
            balance.ledger_id,
            format!("{}:{}", balance.account_id, balance.key),
        )
    }

    fn alias_index_key(balance: &Balance) -> Vec<u8> {
        scoped(balance.organization_id, balance.ledger_id, balance.composite_key())
    }

    fn insert_balance_row(&self, balance: &Balance) -> Result<(), LedgerError> {
        let row = serde_json::to_vec(balance)?;
        self.balances.insert(
            scoped(balance.organization_id, balance.ledger_id, balance.id.to_string()),
            row,
        )?;
        Ok(())
    }
}

#[async_trait]
impl BalanceProvider for SledStorage {
    async fn create_balance(&self, balance: &Balance) -> Result<(), LedgerError> {
        // The account index doubles as the (account_id, key) unique
        // constraint; losing the swap means a concurrent writer won
        let claimed = self.balances_by_account.compare_and_swap(
            Self::account_index_key(balance),
            None as Option<&[u8]>,
            Some(balance.id.to_string().into_bytes()),
        )?;
        if claimed.is_err() {
            return Err(LedgerError::EntityConflict { entity: ENTITY_BALANCE });
        }

        self.insert_balance_row(balance)?;
        self.balances_by_alias
            .insert(Self::alias_index_key(balance), balance.id.to_string().into_bytes())?;
        trace!("balance {} created for account {}", balance.id, balance.account_id);
        Ok(())
    }

    async fn find_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<Balance, LedgerError> {
        self.load_balance(organization_id, ledger_id, balance_id.to_string().as_bytes())
    }

    async fn find_balance_by_account_id_and_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        key: &str,
    ) -> Result<Balance, LedgerError> {
        let index = scoped(organization_id, ledger_id, format!("{}:{}", account_id, key));
        let id_bytes = self
            .balances_by_account
            .get(index)?
            .ok_or(LedgerError::EntityNotFound { entity: ENTITY_BALANCE })?;
        self.load_balance(organization_id, ledger_id, &id_bytes)
    }

    async fn exists_balance_by_account_id_and_key(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        key: &str,
    ) -> Result<bool, LedgerError> {
        let index = scoped(organization_id, ledger_id, format!("{}:{}", account_id, key));
        Ok(self.balances_by_account.contains_key(index)?)
    }

    async fn list_balances_by_account_id(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Balance>, LedgerError> {
        let prefix = scoped(organization_id, ledger_id, format!("{}:", account_id));
        let mut balances = Vec::new();
        for entry in self.balances_by_account.scan_prefix(prefix) {
            let (_, id_bytes) = entry?;
            balances.push(self.load_balance(organization_id, ledger_id, &id_bytes)?);
        }
        Ok(balances)
    }

    async fn list_balances_by_targets(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        targets: &[String],
    ) -> Result<Vec<Balance>, LedgerError> {
        let mut balances = Vec::with_capacity(targets.len());
        for target in targets {
            // A target that parses as an id addresses the row directly
            if let Ok(id) = Uuid::parse_str(target) {
                balances.push(self.find_balance(organization_id, ledger_id, id).await?);
                continue;
            }
            let composite = if target.contains('#') {
                target.clone()
            } else {
                format!("{}#{}", target, DEFAULT_BALANCE_KEY)
            };
            let id_bytes = self
                .balances_by_alias
                .get(scoped(organization_id, ledger_id, &composite))?
                .ok_or(LedgerError::EntityNotFound { entity: ENTITY_BALANCE })?;
            balances.push(self.load_balance(organization_id, ledger_id, &id_bytes)?);
        }
        Ok(balances)
    }

    async fn balances_update(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balances: &[Balance],
        validated: &Responses,
    ) -> Result<Vec<Balance>, LedgerError> {
        let updates = apply_validated_deltas(balances, validated)?;
        let mut prepared = Vec::with_capacity(updates.len());
        for update in &updates {
            prepared.push((
                scoped(organization_id, ledger_id, update.id.to_string()),
                update.version - 1,
                serde_json::to_vec(update)?,
            ));
        }

        // One batch, all rows conditional on the version they were read
        // at; any mismatch aborts the whole batch as a conflict
        let outcome = self.balances.transaction(
            |tree| -> sled::transaction::ConflictableTransactionResult<(), LedgerError> {
                for (key, expected_version, row) in &prepared {
                    let current = tree.get(key)?.ok_or(ConflictableTransactionError::Abort(
                        LedgerError::EntityNotFound { entity: ENTITY_BALANCE },
                    ))?;
                    let current: Balance = serde_json::from_slice(&current).map_err(|_| {
                        ConflictableTransactionError::Abort(LedgerError::BalanceUpdateConflict)
                    })?;
                    if current.version != *expected_version {
                        return Err(ConflictableTransactionError::Abort(
                            LedgerError::BalanceUpdateConflict,
                        ));
                    }
                    tree.insert(key.clone(), row.clone())?;
                }
                Ok(())
            },
        );

        match outcome {
            Ok(()) => Ok(updates),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    async fn update_all_balances_by_account_id(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        allow_sending: bool,
        allow_receiving: bool,
    ) -> Result<(), LedgerError> {
        let balances = self
            .list_balances_by_account_id(organization_id, ledger_id, account_id)
            .await?;
        for mut balance in balances {
            balance.allow_sending = allow_sending;
            balance.allow_receiving = allow_receiving;
            balance.version += 1;
            balance.updated_at = time::now();
            self.insert_balance_row(&balance)?;
        }
        Ok(())
    }

    async fn delete_balances_by_ids(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_ids: &[Uuid],
    ) -> Result<(), LedgerError> {
        for balance_id in balance_ids {
            self.delete_balance(organization_id, ledger_id, *balance_id).await?;
        }
        Ok(())
    }

    async fn delete_balance(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<(), LedgerError> {
        let balance = self.find_balance(organization_id, ledger_id, balance_id).await?;
        self.balances.remove(scoped(organization_id, ledger_id, balance_id.to_string()))?;
        self.balances_by_account.remove(Self::account_index_key(&balance))?;
        self.balances_by_alias.remove(Self::alias_index_key(&balance))?;
        Ok(())
    }

    async fn upsert_balance_if_newer(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance: &Balance,
    ) -> Result<bool, LedgerError> {
        match self.find_balance(organization_id, ledger_id, balance.id).await {
            Ok(stored) if stored.updated_at >= balance.updated_at => Ok(false),
            Ok(_) => {
                self.insert_balance_row(balance)?;
                Ok(true)
            }
            Err(LedgerError::EntityNotFound { .. }) => {
                self.insert_balance_row(balance)?;
                self.balances_by_account.insert(
                    Self::account_index_key(balance),
                    balance.id.to_string().into_bytes(),
                )?;
                self.balances_by_alias
                    .insert(Self::alias_index_key(balance), balance.id.to_string().into_bytes())?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }
}
