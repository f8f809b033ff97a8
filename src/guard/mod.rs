//! Idempotency and concurrency guard
//!
//! - [`IdempotencyGuard`]: first successful result per key, replayed on retry
//! - [`KeyedLocks`]: per-key async mutexes with acquisition timeout, pruned on release
//! - [`LockManager`]: the lock spaces the ledger serializes on

pub mod idempotency;
pub mod locks;

pub use idempotency::{IdempotencyGuard, derive_key};
pub use locks::{KeyGuard, KeyedLocks, LockManager};
