mod providers;

pub mod sled;

pub use self::{providers::*, sled::SledStorage};

// The durable ledger store is the composition of its providers. A SQL
// deployment implements the same capability set behind a connection
// pool; the embedded sled backend is the reference implementation.
pub trait LedgerStore:
    BalanceProvider
    + TransactionProvider
    + OperationProvider
    + RouteProvider
    + SettingProvider
    + Send
    + Sync
    + 'static
{
}

impl<T> LedgerStore for T where
    T: BalanceProvider
        + TransactionProvider
        + OperationProvider
        + RouteProvider
        + SettingProvider
        + Send
        + Sync
        + 'static
{
}
