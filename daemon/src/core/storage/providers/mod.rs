mod balance;
mod operation;
mod route;
mod setting;
mod transaction;

pub use self::{
    balance::BalanceProvider, operation::OperationProvider, route::RouteProvider,
    setting::SettingProvider, transaction::TransactionProvider,
};
