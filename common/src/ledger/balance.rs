use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{DEFAULT_BALANCE_KEY, EXTERNAL_ACCOUNT_TYPE},
    ledger::Account,
    time::{self, Timestamp},
};

// Mutable funds record of one account under one balance key.
// Exactly one balance exists per (account_id, key); the "default" key
// names the primary balance and must exist before any other may.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub account_id: Uuid,
    pub alias: String,
    pub key: String,
    pub asset_code: String,
    pub account_type: String,
    pub available: Decimal,
    pub on_hold: Decimal,
    pub version: i64,
    pub allow_sending: bool,
    pub allow_receiving: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Balance {
    // Fresh default balance for a newly onboarded account
    pub fn default_for_account(account: &Account) -> Self {
        let now = time::now();
        Self {
            id: Uuid::now_v7(),
            organization_id: account.organization_id,
            ledger_id: account.ledger_id,
            account_id: account.id,
            alias: account.alias.clone(),
            key: DEFAULT_BALANCE_KEY.to_string(),
            asset_code: account.asset_code.clone(),
            account_type: account.account_type.clone(),
            available: Decimal::ZERO,
            on_hold: Decimal::ZERO,
            version: 0,
            allow_sending: true,
            allow_receiving: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_BALANCE_KEY
    }

    pub fn is_external(&self) -> bool {
        self.account_type == EXTERNAL_ACCOUNT_TYPE
    }

    // Overdraft policy hook: external counterparty accounts are the only
    // type whose available funds may go negative
    pub fn allows_negative(&self) -> bool {
        self.is_external()
    }

    pub fn holds_funds(&self) -> bool {
        !self.available.is_zero() || !self.on_hold.is_zero()
    }

    // Composite "{alias}#{key}" form used by KV cache entries and by
    // validated delta maps
    pub fn composite_key(&self) -> String {
        format!("{}#{}", self.alias, self.key)
    }

    // True when the balance answers to the given leg target: its id,
    // its composite alias#key form, or the bare alias. A bare alias
    // always names the default balance, never a sibling key.
    pub fn matches_target(&self, target: &str) -> bool {
        self.id.to_string() == target
            || self.composite_key() == target
            || (self.alias == target && self.is_default())
    }
}
