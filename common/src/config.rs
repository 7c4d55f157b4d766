use std::time::Duration;

// Reserved balance key naming the primary balance of an account
pub const DEFAULT_BALANCE_KEY: &str = "default";

// Account type that cannot own additional balances and may go negative
pub const EXTERNAL_ACCOUNT_TYPE: &str = "external";

// Lock lifetime ceiling; a crashed holder frees the alias after this
pub const TIME_SET_LOCK: Duration = Duration::from_secs(30);

// Delay between two attempts on a contended alias lock
pub const LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(200);

// How many times a conflicting balance batch is re-read and re-applied
// before the conflict surfaces to the caller
pub const BALANCE_UPDATE_RETRIES: usize = 3;

// Idempotency reservations outlive the longest client retry window
pub const IDEMPOTENCY_DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// In-flight balance snapshots in the KV store expire on their own
// if no explicit sync or delete reclaims them
pub const BALANCE_CACHE_TTL: Duration = Duration::from_secs(300);

// Metadata keys and rendered values are capped at this many characters
pub const METADATA_MAX_LEN: usize = 100;

// Entity kind names used for metadata documents and audit payloads.
// These are explicit constants, never derived from type identity.
pub const ENTITY_TRANSACTION: &str = "Transaction";
pub const ENTITY_BALANCE: &str = "Balance";
pub const ENTITY_OPERATION: &str = "Operation";
pub const ENTITY_OPERATION_ROUTE: &str = "OperationRoute";
pub const ENTITY_TRANSACTION_ROUTE: &str = "TransactionRoute";
