//! Balance lifecycle and mutation. Creation flows inherit from the
//! default balance and enforce the one-default-first rule; mutation
//! applies validated deltas under optimistic versioning with a bounded
//! retry loop.

use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use tally_common::{
    config::{BALANCE_CACHE_TTL, BALANCE_UPDATE_RETRIES, DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE},
    dsl::Responses,
    ledger::{Account, Balance},
    queue::QueueMessage,
    time,
};

use crate::core::{
    error::LedgerError,
    kv::KvStore,
    lock::LockManager,
    storage::LedgerStore,
};

#[derive(Clone, Debug)]
pub struct CreateBalanceInput {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub account_id: Uuid,
    pub alias: String,
    pub key: String,
    pub asset_code: String,
    pub account_type: String,
    pub allow_sending: Option<bool>,
    pub allow_receiving: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct AdditionalBalanceInput {
    pub key: String,
    pub allow_sending: Option<bool>,
    pub allow_receiving: Option<bool>,
}

// Pure application of validated deltas to a set of balances. Rejects
// forbidden sends/receives and overdrafts, bumps each written version.
// The durable batch write re-checks the version it was computed from.
pub fn apply_validated_deltas(
    balances: &[Balance],
    validated: &Responses,
) -> Result<Vec<Balance>, LedgerError> {
    let mut updates = Vec::new();
    for balance in balances {
        let mut updated = balance.clone();
        let mut touched = false;

        for (target, amount) in &validated.from {
            if balance.matches_target(target) {
                if !balance.allow_sending {
                    return Err(LedgerError::AccountStatusTransactionRestriction {
                        alias: balance.alias.clone(),
                    });
                }
                updated.available -= amount.value;
                touched = true;
            }
        }
        for (target, amount) in &validated.to {
            if balance.matches_target(target) {
                if !balance.allow_receiving {
                    return Err(LedgerError::AccountStatusTransactionRestriction {
                        alias: balance.alias.clone(),
                    });
                }
                updated.available += amount.value;
                touched = true;
            }
        }

        if !touched {
            continue;
        }
        if updated.available < rust_decimal::Decimal::ZERO && !balance.allows_negative() {
            return Err(LedgerError::InsufficientFunds { alias: balance.alias.clone() });
        }
        updated.version += 1;
        updated.updated_at = time::now();
        updates.push(updated);
    }
    Ok(updates)
}

pub struct BalanceEngine {
    store: Arc<dyn LedgerStore>,
    kv: Arc<dyn KvStore>,
}

impl BalanceEngine {
    pub fn new(store: Arc<dyn LedgerStore>, kv: Arc<dyn KvStore>) -> Self {
        Self { store, kv }
    }

    // Consume an onboarding message and seed one default balance per
    // account payload. Replays are expected; a duplicate insert means a
    // concurrent consumer already seeded the account.
    pub async fn create_from_account_event(
        &self,
        message: &QueueMessage,
    ) -> Result<Vec<Balance>, LedgerError> {
        let mut created = Vec::new();
        for data in &message.queue_data {
            let account: Account = serde_json::from_slice(&data.value)?;
            let balance = Balance::default_for_account(&account);
            match self.store.create_balance(&balance).await {
                Ok(()) => created.push(balance),
                Err(err) if err.is_unique_violation() => {
                    info!("default balance for account {} already exists", account.id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(created)
    }

    // Create a balance with full invariants: the key is normalized, a
    // non-default key requires an existing default, external accounts
    // stay single-balance, and (account, key) is unique
    pub async fn create_sync(&self, input: CreateBalanceInput) -> Result<Balance, LedgerError> {
        let key = input.key.trim().to_lowercase();

        if key != DEFAULT_BALANCE_KEY {
            let has_default = self
                .store
                .exists_balance_by_account_id_and_key(
                    input.organization_id,
                    input.ledger_id,
                    input.account_id,
                    DEFAULT_BALANCE_KEY,
                )
                .await?;
            if !has_default {
                return Err(LedgerError::DefaultBalanceNotFound);
            }
            if input.account_type == EXTERNAL_ACCOUNT_TYPE {
                return Err(LedgerError::AdditionalBalanceNotAllowed);
            }
        }

        let exists = self
            .store
            .exists_balance_by_account_id_and_key(
                input.organization_id,
                input.ledger_id,
                input.account_id,
                &key,
            )
            .await?;
        if exists {
            return Err(LedgerError::DuplicatedAliasKeyValue);
        }

        let now = time::now();
        let balance = Balance {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            ledger_id: input.ledger_id,
            account_id: input.account_id,
            alias: input.alias,
            key,
            asset_code: input.asset_code,
            account_type: input.account_type,
            available: rust_decimal::Decimal::ZERO,
            on_hold: rust_decimal::Decimal::ZERO,
            version: 0,
            allow_sending: input.allow_sending.unwrap_or(true),
            allow_receiving: input.allow_receiving.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        match self.store.create_balance(&balance).await {
            Ok(()) => Ok(balance),
            // A concurrent writer slipped past the exists check
            Err(err) if err.is_unique_violation() => Err(LedgerError::DuplicatedAliasKeyValue),
            Err(err) => Err(err),
        }
    }

    // Additional balance on demand: alias, asset and account type come
    // from the default balance, never from the caller
    pub async fn create_additional(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
        input: AdditionalBalanceInput,
    ) -> Result<Balance, LedgerError> {
        let default = self
            .store
            .find_balance_by_account_id_and_key(
                organization_id,
                ledger_id,
                account_id,
                DEFAULT_BALANCE_KEY,
            )
            .await
            .map_err(|err| match err {
                LedgerError::EntityNotFound { .. } => LedgerError::DefaultBalanceNotFound,
                other => other,
            })?;

        self.create_sync(CreateBalanceInput {
            organization_id,
            ledger_id,
            account_id,
            alias: default.alias,
            key: input.key,
            asset_code: default.asset_code,
            account_type: default.account_type,
            allow_sending: input.allow_sending,
            allow_receiving: input.allow_receiving,
        })
        .await
    }

    // Apply validated deltas to the participating balances. A version
    // conflict re-reads the participants and retries a bounded number
    // of times before surfacing; fresh snapshots land in the KV cache
    // for in-flight detection and read-your-writes.
    pub async fn mutate(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        mut balances: Vec<Balance>,
        validated: &Responses,
    ) -> Result<Vec<Balance>, LedgerError> {
        let mut attempts = 0;
        loop {
            match self
                .store
                .balances_update(organization_id, ledger_id, &balances, validated)
                .await
            {
                Ok(updated) => {
                    for balance in &updated {
                        if let Err(err) = self
                            .kv
                            .cache_balance(organization_id, ledger_id, balance, BALANCE_CACHE_TTL)
                            .await
                        {
                            warn!("failed to cache balance {}: {}", balance.id, err);
                        }
                    }
                    return Ok(updated);
                }
                Err(err) if err.is_retryable_conflict() && attempts < BALANCE_UPDATE_RETRIES => {
                    attempts += 1;
                    metrics::counter!("command.balance_update_conflict").increment(1);
                    warn!(
                        "balance batch conflicted, retry {}/{}",
                        attempts, BALANCE_UPDATE_RETRIES
                    );
                    balances = self
                        .store
                        .list_balances_by_targets(organization_id, ledger_id, &validated.aliases)
                        .await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    // Push a cached snapshot to the durable store iff it is strictly
    // newer; false means the store was already at or ahead
    pub async fn sync_cached(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        cached: &Balance,
    ) -> Result<bool, LedgerError> {
        self.store
            .upsert_balance_if_newer(organization_id, ledger_id, cached)
            .await
    }

    // Hard delete of one balance, refused while it holds funds
    pub async fn delete_one(
        &self,
        organization_id: Uuid,
        ledger_id: Uuid,
        balance_id: Uuid,
    ) -> Result<(), LedgerError> {
        let balance = self.store.find_balance(organization_id, ledger_id, balance_id).await?;
        if balance.holds_funds() {
            return Err(LedgerError::BalancesCantBeDeleted);
        }
        self.store.delete_balance(organization_id, ledger_id, balance_id).await
    }

    // Delete every balance of an account. Transfers are frozen first so
    // no new movement slips in between the checks and the delete; the
    // freeze is rolled back if the delete fails.
    pub async fn delete_all_for_account(
        &self,
        locks: &LockManager,
        organization_id: Uuid,
        ledger_id: Uuid,
        account_id: Uuid,
    ) -> Result<(), LedgerError> {
        let balances = self
            .store
            .list_balances_by_account_id(organization_id, ledger_id, account_id)
            .await?;
        if balances.is_empty() {
            return Ok(());
        }

        for balance in &balances {
            let in_flight = self
                .kv
                .list_balance_by_key(organization_id, ledger_id, &balance.composite_key())
                .await?;
            if in_flight.is_some() {
                warn!("balance {} has an in-flight transaction, refusing delete", balance.id);
                return Err(LedgerError::BalancesCantBeDeleted);
            }
            if balance.holds_funds() {
                return Err(LedgerError::BalancesCantBeDeleted);
            }
        }

        locks
            .toggle_transfers(organization_id, ledger_id, account_id, false)
            .await?;

        let ids: Vec<Uuid> = balances.iter().map(|b| b.id).collect();
        if let Err(err) = self
            .store
            .delete_balances_by_ids(organization_id, ledger_id, &ids)
            .await
        {
            // Re-enable transfers so the account is usable again, then
            // surface the original failure
            if let Err(rollback_err) = locks
                .toggle_transfers(organization_id, ledger_id, account_id, true)
                .await
            {
                warn!(
                    "failed to roll back transfer freeze on account {}: {}",
                    account_id, rollback_err
                );
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_common::dsl::Amount;

    fn balance(alias: &str, available: Decimal) -> Balance {
        let now = time::now();
        Balance {
            id: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            ledger_id: Uuid::now_v7(),
            account_id: Uuid::now_v7(),
            alias: alias.to_string(),
            key: DEFAULT_BALANCE_KEY.to_string(),
            asset_code: "USD".to_string(),
            account_type: "deposit".to_string(),
            available,
            on_hold: Decimal::ZERO,
            version: 3,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn validated(from: &[(&str, Decimal)], to: &[(&str, Decimal)]) -> Responses {
        let map = |pairs: &[(&str, Decimal)]| {
            pairs
                .iter()
                .map(|(alias, value)| {
                    (alias.to_string(), Amount { asset: "USD".to_string(), value: *value })
                })
                .collect::<IndexMap<_, _>>()
        };
        let sources: Vec<String> = from.iter().map(|(a, _)| a.to_string()).collect();
        let destinations: Vec<String> = to.iter().map(|(a, _)| a.to_string()).collect();
        let mut aliases = sources.clone();
        aliases.extend(destinations.clone());
        Responses {
            total: from.iter().map(|(_, v)| *v).sum(),
            asset: "USD".to_string(),
            from: map(from),
            to: map(to),
            sources,
            destinations,
            aliases,
        }
    }

    #[test]
    fn deltas_move_available_and_bump_versions() {
        let source = balance("@cash", dec!(100));
        let destination = balance("@merchant", dec!(5));
        let updates = apply_validated_deltas(
            &[source.clone(), destination.clone()],
            &validated(&[("@cash", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap();
        assert_eq!(updates[0].available, dec!(60));
        assert_eq!(updates[0].version, source.version + 1);
        assert_eq!(updates[1].available, dec!(45));
        assert_eq!(updates[1].version, destination.version + 1);
    }

    #[test]
    fn overdraft_is_refused_for_internal_accounts() {
        let source = balance("@cash", dec!(10));
        let err = apply_validated_deltas(
            &[source],
            &validated(&[("@cash", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { alias } if alias == "@cash"));
    }

    #[test]
    fn external_accounts_may_go_negative() {
        let mut source = balance("@world", dec!(0));
        source.account_type = EXTERNAL_ACCOUNT_TYPE.to_string();
        let updates = apply_validated_deltas(
            &[source],
            &validated(&[("@world", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap();
        assert_eq!(updates[0].available, dec!(-40));
    }

    #[test]
    fn disabled_sending_blocks_the_source() {
        let mut source = balance("@cash", dec!(100));
        source.allow_sending = false;
        let err = apply_validated_deltas(
            &[source],
            &validated(&[("@cash", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccountStatusTransactionRestriction { alias } if alias == "@cash"
        ));
    }

    #[test]
    fn disabled_receiving_blocks_the_destination() {
        let mut destination = balance("@merchant", dec!(0));
        destination.allow_receiving = false;
        let err = apply_validated_deltas(
            &[destination],
            &validated(&[("@cash", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AccountStatusTransactionRestriction { alias } if alias == "@merchant"
        ));
    }

    #[test]
    fn untouched_balances_are_not_written() {
        let bystander = balance("@other", dec!(10));
        let updates = apply_validated_deltas(
            &[bystander],
            &validated(&[("@cash", dec!(40))], &[("@merchant", dec!(40))]),
        )
        .unwrap();
        assert!(updates.is_empty());
    }
}
