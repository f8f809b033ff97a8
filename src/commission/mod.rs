//! IB commission: tiering, accrual and payout

pub mod engine;
pub mod models;
pub mod scheduler;
pub mod tier;

pub use engine::{CommissionEngine, CommissionPolicy};
pub use models::{
    AccrualOutcome, CommissionAccrual, IbProfile, Payout, PayoutStatus, Period, VolumeSample,
};
pub use scheduler::PayoutScheduler;
pub use tier::{Tier, TierSlice, TieredCommission, tiered_commission};
