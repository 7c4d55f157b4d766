//! Envelope and payload types carried over the message bus and the KV
//! backup queue. Payload bytes are opaque to the envelope; transaction
//! payloads are msgpack, account and audit payloads are JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dsl, ledger::Balance, ledger::Transaction};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueData {
    pub id: Uuid,
    pub value: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub organization_id: Uuid,
    pub ledger_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    // Audit envelopes are keyed by the transaction they trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<Uuid>,
    pub queue_data: Vec<QueueData>,
}

// Async execution payload: everything the sync executor needs to replay
// the write without touching the request path again
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQueue {
    pub validate: dsl::Responses,
    pub balances: Vec<Balance>,
    pub transaction: Transaction,
    pub parse_dsl: dsl::Send,
}
