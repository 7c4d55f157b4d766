use thiserror::Error;

use tally_common::error::{DslError, MetadataError};

#[derive(Debug, Error)]
pub enum KvError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Value at {0} is not valid UTF-8")]
    NotText(String),

    #[error("KV codec failure: {0}")]
    Codec(String),
}

impl KvError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} not found")]
    EntityNotFound { entity: &'static str },

    #[error("{entity} already exists")]
    EntityConflict { entity: &'static str },

    #[error("No default balance exists for the account")]
    DefaultBalanceNotFound,

    #[error("External accounts cannot own additional balances")]
    AdditionalBalanceNotAllowed,

    #[error("A balance with this alias and key already exists")]
    DuplicatedAliasKeyValue,

    #[error("Balance holds funds or is in use and cannot be deleted")]
    BalancesCantBeDeleted,

    #[error("Idempotency key is already in use")]
    IdempotencyKeyAlreadyInUse,

    #[error("Only indexes prefixed with \"metadata.\" may be deleted")]
    MetadataIndexDeletionForbidden,

    #[error("Operation route is linked to one or more transaction routes")]
    OperationRouteLinkedToTransactionRoutes,

    #[error("Operation route not found")]
    OperationRouteNotFound,

    #[error("Alias and account type rules are mutually exclusive")]
    MutuallyExclusiveFields,

    #[error("An operation route with this title already exists")]
    OperationRouteTitleAlreadyExists,

    #[error("Status transition {from} -> {to} is not allowed")]
    InvalidStatusTransition { from: String, to: String },

    // Optimistic-version conflict; retried inside the balance engine
    // and only surfaced once the retries run out
    #[error("Balance version conflict")]
    BalanceUpdateConflict,

    #[error("Insufficient funds on balance {alias}")]
    InsufficientFunds { alias: String },

    #[error("Balance {alias} does not accept this operation")]
    AccountStatusTransactionRestriction { alias: String },

    #[error("Lock on alias {alias} could not be acquired before the lifetime ceiling")]
    LockAcquisitionTimeout { alias: String },

    #[error("No audit payload could be serialized for transaction {transaction_id}")]
    AuditPayloadUnserializable { transaction_id: uuid::Uuid },

    #[error(transparent)]
    Dsl(#[from] DslError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("Durable store failure: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload encode failure: {0}")]
    PayloadEncode(#[from] rmp_serde::encode::Error),

    #[error("Payload decode failure: {0}")]
    PayloadDecode(#[from] rmp_serde::decode::Error),

    #[error("Bus publish failure: {0}")]
    Bus(String),
}

impl LedgerError {
    // Duplicate-key signal from the durable store. Some write paths
    // treat this as idempotent success.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, LedgerError::EntityConflict { .. })
    }

    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, LedgerError::BalanceUpdateConflict)
    }
}
