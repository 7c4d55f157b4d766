use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dsl,
    ledger::{Metadata, Operation},
    time::{self, Timestamp},
};

// Lifecycle of a transaction header. CREATED and PENDING may still move;
// APPROVED, CANCELED and DECLINED are terminal.
#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum StatusCode {
    Created,
    Pending,
    Approved,
    Canceled,
    Declined,
}

impl StatusCode {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCode::Approved | StatusCode::Canceled | StatusCode::Declined)
    }

    // Allowed transitions form a DAG; anything else is refused
    pub fn can_transition_to(&self, next: StatusCode) -> bool {
        match self {
            StatusCode::Created => matches!(
                next,
                StatusCode::Pending | StatusCode::Approved | StatusCode::Canceled | StatusCode::Declined
            ),
            StatusCode::Pending => {
                matches!(next, StatusCode::Approved | StatusCode::Canceled | StatusCode::Declined)
            }
            StatusCode::Approved => matches!(next, StatusCode::Canceled),
            StatusCode::Canceled | StatusCode::Declined => false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Status {
    pub fn approved() -> Self {
        Self { code: StatusCode::Approved, description: None }
    }

    pub fn canceled(description: Option<String>) -> Self {
        Self { code: StatusCode::Canceled, description }
    }
}

// Atomic value-movement header. The body holds the parsed request the
// transaction was created from so snapshots replay without re-parsing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_transaction_id: Option<Uuid>,
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    pub description: String,
    pub asset_code: String,
    pub amount: Decimal,
    pub chart_of_accounts_group_name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<dsl::Send>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Transaction {
    // New approved header for a validated value movement; ids are
    // time-ordered so storage scans follow creation order
    pub fn approved(
        organization_id: Uuid,
        ledger_id: Uuid,
        parent_transaction_id: Option<Uuid>,
        send: &dsl::Send,
        total: Decimal,
    ) -> Self {
        let now = time::now();
        Self {
            id: Uuid::now_v7(),
            parent_transaction_id,
            organization_id,
            ledger_id,
            description: send.description.clone().unwrap_or_default(),
            asset_code: send.asset.clone(),
            amount: total,
            chart_of_accounts_group_name: send.chart_of_accounts_group_name.clone().unwrap_or_default(),
            status: Status::approved(),
            body: None,
            operations: Vec::new(),
            metadata: send.metadata.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_form_a_dag() {
        assert!(StatusCode::Created.can_transition_to(StatusCode::Approved));
        assert!(StatusCode::Pending.can_transition_to(StatusCode::Canceled));
        assert!(StatusCode::Approved.can_transition_to(StatusCode::Canceled));
        assert!(!StatusCode::Canceled.can_transition_to(StatusCode::Approved));
        assert!(!StatusCode::Declined.can_transition_to(StatusCode::Pending));
    }

    #[test]
    fn status_code_round_trips_as_screaming_case() {
        let json = serde_json::to_string(&StatusCode::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
        let back: StatusCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StatusCode::Approved);
    }
}
