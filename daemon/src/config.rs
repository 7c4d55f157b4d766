use std::env;

// Topic and feature configuration for the transaction write path.
// Loaded once at process start and injected everywhere; nothing in the
// core reads the environment after this.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    // Balance/transaction/operation async execution topic
    pub transaction_balance_operation_exchange: String,
    pub transaction_balance_operation_key: String,
    // Audit trail topic
    pub audit_exchange: String,
    pub audit_key: String,
    // "false" disables audit publishing; anything else enables it
    pub audit_enabled: bool,
    // Fallback topic for balance batches that exhausted their retries
    pub balance_retry_exchange: String,
    pub balance_retry_key: String,
    // Selects the queue-driven execution path over the inline one
    pub async_transactions: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            transaction_balance_operation_exchange: var_or(
                "RABBITMQ_TRANSACTION_BALANCE_OPERATION_EXCHANGE",
                "transaction.balance_operation.exchange",
            ),
            transaction_balance_operation_key: var_or(
                "RABBITMQ_TRANSACTION_BALANCE_OPERATION_KEY",
                "transaction.balance_operation.key",
            ),
            audit_exchange: var_or(
                "RABBITMQ_AUDIT_EXCHANGE",
                &var_or("RABBITMQ_TRANSACTION_AUDIT_EXCHANGE", "transaction.audit.exchange"),
            ),
            audit_key: var_or(
                "RABBITMQ_AUDIT_KEY",
                &var_or("RABBITMQ_TRANSACTION_AUDIT_KEY", "transaction.audit.key"),
            ),
            audit_enabled: env::var("AUDIT_LOG_ENABLED").map(|v| v != "false").unwrap_or(true),
            balance_retry_exchange: var_or(
                "RABBITMQ_BALANCE_RETRY_EXCHANGE",
                "balance.retry.exchange",
            ),
            balance_retry_key: var_or("RABBITMQ_BALANCE_RETRY_KEY", "balance.retry.key"),
            async_transactions: env::var("RABBITMQ_TRANSACTION").map(|v| v == "true").unwrap_or(false),
        }
    }
}

impl Default for ServiceConfig {
    // Defaults mirror an unset environment: inline execution, audit on
    fn default() -> Self {
        Self {
            transaction_balance_operation_exchange: "transaction.balance_operation.exchange".to_string(),
            transaction_balance_operation_key: "transaction.balance_operation.key".to_string(),
            audit_exchange: "transaction.audit.exchange".to_string(),
            audit_key: "transaction.audit.key".to_string(),
            audit_enabled: true,
            balance_retry_exchange: "balance.retry.exchange".to_string(),
            balance_retry_key: "balance.retry.key".to_string(),
            async_transactions: false,
        }
    }
}

fn var_or(name: &str, fallback: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.to_string())
}
