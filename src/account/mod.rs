//! Trading accounts and their balance projection

pub mod aggregate;
pub mod models;

pub use aggregate::AccountAggregate;
pub use models::{Account, AccountStatus, AccountType, BalanceSnapshot};
