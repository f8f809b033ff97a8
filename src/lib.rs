//! fxledger - Forex Back-Office Ledger Core
//!
//! Deposits, withdrawals and internal transfers move through a PENDING →
//! PROCESSING → COMPLETED/REJECTED lifecycle; every balance change is an
//! immutable ledger entry and balances are projections over those entries.
//!
//! # Modules
//!
//! - [`money`] - Currency codes, amount parsing and formatting
//! - [`core_types`] - Identifier newtypes
//! - [`error`] - `LedgerError` taxonomy
//! - [`ledger`] - Ledger entries and atomic commit batches
//! - [`store`] - `LedgerStore` trait, in-memory and PostgreSQL backends
//! - [`account`] - Account records and the balance aggregate
//! - [`transaction`] - Transaction state machine and limits
//! - [`commission`] - IB tiering, accrual and payout
//! - [`guard`] - Idempotency keys and keyed locks
//! - [`events`] - Transition events and sinks
//! - [`reconciliation`] - Ledger vs. cache consistency sweep
//! - [`services`] - Service wiring
//! - [`gateway`] - HTTP handlers

// Core types - must be first!
pub mod core_types;
pub mod error;
pub mod money;

// Ledger core
pub mod account;
pub mod commission;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod reconciliation;
pub mod store;
pub mod transaction;

// Ambient
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod services;

// Convenient re-exports at crate root
pub use account::{Account, AccountAggregate, AccountStatus, AccountType, BalanceSnapshot};
pub use commission::{CommissionEngine, CommissionPolicy, Payout, Period};
pub use core_types::{AccountId, AccrualId, ClientId, EntryId, IbId, TransactionId};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{CommitBatch, EntryKind, LedgerEntry};
pub use money::Currency;
pub use services::LedgerServices;
pub use store::{LedgerStore, MemoryStore};
pub use transaction::{
    Approval, LimitPolicy, Transaction, TransactionKind, TransactionRequest,
    TransactionStateMachine, TransactionStatus,
};
