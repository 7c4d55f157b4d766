use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Small per-ledger feature setting; the boolean flag is the common case,
// value carries the free-form string settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub key: String,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
