//! Core types used throughout the system
//!
//! Identifier newtypes shared by every module. Numeric ids come from the
//! provisioning side (trading logins, IB partner ids); ULID ids are minted
//! by the ledger itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Client ID - owner of one or more trading accounts (provisioning service)
pub type ClientId = u64;

/// Trading account login number.
///
/// # Constraints:
/// - **Immutable**: assigned by the provisioning service, never reused
/// - **Ordered**: lock acquisition sorts by this id to avoid deadlocks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AccountId {
    fn from(v: u64) -> Self {
        AccountId(v)
    }
}

/// Introducing Broker (referral partner) ID
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IbId(pub u64);

impl fmt::Display for IbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IB-{}", self.0)
    }
}

impl From<u64> for IbId {
    fn from(v: u64) -> Self {
        IbId(v)
    }
}

/// ULID-backed identifier: monotonic, sortable, no coordination needed.
macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(ulid::Ulid);

        impl $name {
            /// Generate a new unique id
            pub fn new() -> Self {
                Self(ulid::Ulid::new())
            }

            /// Get the inner ULID value
            pub fn inner(&self) -> ulid::Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(ulid::Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(
    /// Transaction ID (deposit, withdrawal, transfer or commission payout)
    TransactionId
);

ulid_id!(
    /// Ledger entry ID
    EntryId
);

ulid_id!(
    /// Commission accrual ID; also the payout id of that accrual
    AccrualId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulid_id_roundtrip() {
        let id = TransactionId::new();
        let parsed: TransactionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<TransactionId>().is_err());
    }

    #[test]
    fn test_ulid_ids_are_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }

    #[test]
    fn test_account_id_ordering_and_serde() {
        assert!(AccountId(5) < AccountId(7));
        assert_eq!(serde_json::to_string(&AccountId(42)).unwrap(), "42");
        assert_eq!(IbId(9).to_string(), "IB-9");
    }
}
