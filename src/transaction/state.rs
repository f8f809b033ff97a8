//! Transaction status definitions
//!
//! Status IDs are stored as SMALLINT. Terminal states: COMPLETED (40),
//! REJECTED (-10).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction status
///
/// ```text
/// PENDING ──▶ PROCESSING ──▶ COMPLETED
///    │             │
///    └─────────────┴──────▶ REJECTED
/// ```
///
/// PROCESSING marks an approval whose ledger batch is in flight. A batch
/// that failed to store leaves the transaction here; approving again with
/// the same idempotency key resumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i16)]
pub enum TransactionStatus {
    /// Requested, no ledger entries
    Pending = 0,

    /// Approval started, batch not yet committed
    Processing = 10,

    /// Terminal: ledger entries committed
    Completed = 40,

    /// Terminal: no ledger entries, never will have
    Rejected = -10,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Rejected
        )
    }

    /// Whether `self -> to` is a legal transition
    pub fn can_transition_to(&self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Rejected)
                | (Processing, Completed)
                | (Processing, Rejected)
                // approval refused for funds after PROCESSING was set
                | (Processing, Pending)
        )
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransactionStatus::Pending),
            10 => Some(TransactionStatus::Processing),
            40 => Some(TransactionStatus::Completed),
            -10 => Some(TransactionStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i16> for TransactionStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransactionStatus::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
    }

    #[test]
    fn test_transitions_are_one_directional() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Processing.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Completed));
    }

    #[test]
    fn test_state_id_roundtrip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Completed,
            TransactionStatus::Rejected,
        ] {
            assert_eq!(TransactionStatus::from_id(status.id()), Some(status));
        }
        assert!(TransactionStatus::from_id(999).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionStatus::Pending.to_string(), "PENDING");
        assert_eq!(TransactionStatus::Rejected.to_string(), "REJECTED");
    }
}
