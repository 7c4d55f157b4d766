use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ledger::Metadata, time::Timestamp};

// One leg of a transaction against one balance. DEBIT and CREDIT are the
// only kinds the write path emits; ON_HOLD marks reservations carried by
// pending transactions until they commit or cancel.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Debit,
    Credit,
    OnHold,
}

impl OperationKind {
    pub fn is_debit(&self) -> bool {
        matches!(self, OperationKind::Debit)
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, OperationKind::Credit)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationAmount {
    pub asset: String,
    pub value: Decimal,
}

// Snapshot of a balance around one leg; version is the durable row
// version the snapshot was taken at
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationBalance {
    pub available: Decimal,
    pub on_hold: Decimal,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub asset_code: String,
    pub amount: OperationAmount,
    pub balance: OperationBalance,
    pub balance_after: OperationBalance,
    pub balance_id: Uuid,
    pub account_id: Uuid,
    pub account_alias: String,
    pub balance_key: String,
    pub description: String,
    pub chart_of_accounts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
