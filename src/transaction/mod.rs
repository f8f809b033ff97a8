//! Transaction lifecycle
//!
//! - [`types`]: transaction record, legs and requests
//! - [`state`]: status enum and legal transitions
//! - [`limits`]: minimum amounts and the daily withdrawal cap
//! - [`machine`]: create / approve / reject

pub mod limits;
pub mod machine;
pub mod state;
pub mod types;

pub use limits::LimitPolicy;
pub use machine::{Approval, TransactionStateMachine};
pub use state::TransactionStatus;
pub use types::{
    Finalization, Transaction, TransactionKind, TransactionLegs, TransactionRequest,
};
