use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::EXTERNAL_ACCOUNT_TYPE, time::Timestamp};

// Account as carried on the onboarding queue. Accounts are owned by the
// onboarding service; the ledger core only reads them to seed balances.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub alias: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub asset_code: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    pub fn is_external(&self) -> bool {
        self.account_type == EXTERNAL_ACCOUNT_TYPE
    }
}
