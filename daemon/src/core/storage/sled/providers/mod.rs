mod balance;
mod operation;
mod route;
mod setting;
mod transaction;
