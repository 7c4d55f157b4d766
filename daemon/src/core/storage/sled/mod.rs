//! Embedded durable backend. One tree per entity kind plus small index
//! trees standing in for the unique constraints and foreign keys a SQL
//! schema would enforce.

mod providers;

use std::path::Path;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::core::error::LedgerError;

pub struct SledStorage {
    #[allow(dead_code)]
    db: sled::Db,
    balances: sled::Tree,
    // (org, ledger, account_id, key) -> balance id; the uniqueness guard
    balances_by_account: sled::Tree,
    // (org, ledger, "alias#key") -> balance id
    balances_by_alias: sled::Tree,
    transactions: sled::Tree,
    operations: sled::Tree,
    // (org, ledger, tx id, op id) -> op id
    operations_by_transaction: sled::Tree,
    operation_routes: sled::Tree,
    // (org, ledger, title) -> route id; the title uniqueness guard
    operation_route_titles: sled::Tree,
    transaction_routes: sled::Tree,
    // (org, ledger, operation route id, transaction route id) -> ()
    transaction_route_links: sled::Tree,
    settings: sled::Tree,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Ok(Self {
            balances: db.open_tree("balances")?,
            balances_by_account: db.open_tree("balances_by_account")?,
            balances_by_alias: db.open_tree("balances_by_alias")?,
            transactions: db.open_tree("transactions")?,
            operations: db.open_tree("operations")?,
            operations_by_transaction: db.open_tree("operations_by_transaction")?,
            operation_routes: db.open_tree("operation_routes")?,
            operation_route_titles: db.open_tree("operation_route_titles")?,
            transaction_routes: db.open_tree("transaction_routes")?,
            transaction_route_links: db.open_tree("transaction_route_links")?,
            settings: db.open_tree("settings")?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

// Every key is scoped by tenancy so one tree serves all ledgers
pub(super) fn scoped(organization_id: Uuid, ledger_id: Uuid, rest: impl AsRef<str>) -> Vec<u8> {
    format!("{}:{}:{}", organization_id, ledger_id, rest.as_ref()).into_bytes()
}

pub(super) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    Ok(serde_json::from_slice(bytes)?)
}
