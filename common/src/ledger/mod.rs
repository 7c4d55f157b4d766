mod account;
mod balance;
mod metadata;
mod operation;
mod route;
mod setting;
mod transaction;

pub use account::Account;
pub use balance::Balance;
pub use metadata::{validate_metadata, Metadata};
pub use operation::{Operation, OperationAmount, OperationBalance, OperationKind};
pub use route::{AccountRule, OperationRoute, OperationRouteType, RuleType, TransactionRoute, ValidIf};
pub use setting::Setting;
pub use transaction::{Status, StatusCode, Transaction};
