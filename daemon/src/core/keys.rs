//! Deterministic namespaced keys for everything the KV store holds.
//! Prefixes are stable within a deployment; changing one orphans the
//! entries written under the old form.

use uuid::Uuid;

pub fn idempotency_key(organization_id: Uuid, ledger_id: Uuid, user_key: &str) -> String {
    format!("idempotency:{}:{}:{}", organization_id, ledger_id, user_key)
}

// Reverse mapping so a transaction id can recover its idempotency key
pub fn idempotency_reverse_key(organization_id: Uuid, ledger_id: Uuid, transaction_id: Uuid) -> String {
    format!("idempotency_tx:{}:{}:{}", organization_id, ledger_id, transaction_id)
}

pub fn lock_key(organization_id: Uuid, ledger_id: Uuid, alias: &str) -> String {
    format!("lock:{}:{}:{}", organization_id, ledger_id, alias)
}

pub fn write_behind_key(organization_id: Uuid, ledger_id: Uuid, transaction_id: Uuid) -> String {
    format!("write_behind:{}:{}:{}", organization_id, ledger_id, transaction_id)
}

pub fn routes_key(organization_id: Uuid, ledger_id: Uuid, route_id: Uuid) -> String {
    format!("routes:{}:{}:{}", organization_id, ledger_id, route_id)
}

pub fn settings_key(organization_id: Uuid, ledger_id: Uuid, setting_key: &str) -> String {
    format!("settings:{}:{}:{}", organization_id, ledger_id, setting_key)
}

// Balance cache keys use the composite "{alias}#{key}" form
pub fn balance_cache_key(organization_id: Uuid, ledger_id: Uuid, composite: &str) -> String {
    format!("balance:{}:{}:{}", organization_id, ledger_id, composite)
}

// Backup queue of pending async transaction payloads per tenancy
pub fn backup_queue_key(organization_id: Uuid, ledger_id: Uuid) -> String {
    format!("queue:transaction:{}:{}", organization_id, ledger_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_deterministic() {
        let org = Uuid::nil();
        let ledger = Uuid::nil();
        assert_eq!(
            idempotency_key(org, ledger, "K"),
            format!("idempotency:{org}:{ledger}:K")
        );
        assert_eq!(lock_key(org, ledger, "@a"), format!("lock:{org}:{ledger}:@a"));
        assert_eq!(
            balance_cache_key(org, ledger, "@a#default"),
            format!("balance:{org}:{ledger}:@a#default")
        );
        // distinct prefixes never collide for equal suffixes
        assert_ne!(
            settings_key(org, ledger, "x"),
            idempotency_key(org, ledger, "x")
        );
    }
}
