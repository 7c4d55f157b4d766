use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::Timestamp;

// Which side of a value movement an operation route constrains
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationRouteType {
    Source,
    Destination,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Alias,
    AccountType,
}

// A rule value is either a single token or a list of acceptable tokens
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValidIf {
    One(String),
    Many(Vec<String>),
}

impl ValidIf {
    pub fn accepts(&self, candidate: &str) -> bool {
        match self {
            ValidIf::One(token) => token == candidate,
            ValidIf::Many(tokens) => tokens.iter().any(|t| t == candidate),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountRule {
    pub rule_type: RuleType,
    pub valid_if: ValidIf,
}

// Reusable validation rule constraining which accounts may take one leg
// of a transaction
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationRoute {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    pub description: String,
    pub operation_type: OperationRouteType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountRule>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// Bundles operation routes into a reviewable whole. An operation route
// referenced here cannot be deleted while the reference stands.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRoute {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub title: String,
    pub description: String,
    pub operation_routes: Vec<Uuid>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_if_accepts_single_and_list_forms() {
        assert!(ValidIf::One("@cash".into()).accepts("@cash"));
        assert!(!ValidIf::One("@cash".into()).accepts("@fees"));
        let many = ValidIf::Many(vec!["deposit".into(), "savings".into()]);
        assert!(many.accepts("savings"));
        assert!(!many.accepts("external"));
    }

    #[test]
    fn valid_if_serde_is_untagged() {
        let one: ValidIf = serde_json::from_str("\"@cash\"").unwrap();
        assert_eq!(one, ValidIf::One("@cash".into()));
        let many: ValidIf = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(many, ValidIf::Many(vec!["a".into(), "b".into()]));
    }
}
