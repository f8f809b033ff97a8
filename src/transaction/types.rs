//! Transaction core types
//!
//! `TransactionLegs` is a closed variant: each kind carries exactly the
//! account references it needs, so a transfer with a single account (or a
//! deposit with two) cannot be constructed.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, AccrualId, TransactionId};
use crate::error::LedgerError;
use crate::ledger::{EntryKind, LedgerEntry};
use crate::money::Currency;

use super::state::TransactionStatus;

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransactionKind {
    Deposit = 1,
    Withdrawal = 2,
    InternalTransfer = 3,
    CommissionPayout = 4,
}

impl TransactionKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransactionKind::Deposit),
            2 => Some(TransactionKind::Withdrawal),
            3 => Some(TransactionKind::InternalTransfer),
            4 => Some(TransactionKind::CommissionPayout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "DEPOSIT",
            TransactionKind::Withdrawal => "WITHDRAWAL",
            TransactionKind::InternalTransfer => "INTERNAL_TRANSFER",
            TransactionKind::CommissionPayout => "COMMISSION_PAYOUT",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account references of a transaction, per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionLegs {
    Deposit {
        account: AccountId,
    },
    Withdrawal {
        account: AccountId,
    },
    InternalTransfer {
        from: AccountId,
        to: AccountId,
    },
    CommissionPayout {
        pool: AccountId,
        ib_account: AccountId,
        accrual: AccrualId,
    },
}

impl TransactionLegs {
    /// Build legs from the loosely-shaped create request
    ///
    /// Commission payouts are only minted by the payout engine.
    pub fn from_request(
        kind: TransactionKind,
        from_account: AccountId,
        to_account: Option<AccountId>,
    ) -> Result<Self, LedgerError> {
        match (kind, to_account) {
            (TransactionKind::Deposit, None) => Ok(TransactionLegs::Deposit {
                account: from_account,
            }),
            (TransactionKind::Withdrawal, None) => Ok(TransactionLegs::Withdrawal {
                account: from_account,
            }),
            (TransactionKind::Deposit | TransactionKind::Withdrawal, Some(_)) => {
                Err(LedgerError::Validation(format!(
                    "{} takes a single account",
                    kind
                )))
            }
            (TransactionKind::InternalTransfer, None) => Err(LedgerError::Validation(
                "INTERNAL_TRANSFER requires a destination account".into(),
            )),
            (TransactionKind::InternalTransfer, Some(to)) if to == from_account => {
                Err(LedgerError::InvalidTransfer(format!(
                    "source and destination are the same account ({})",
                    to
                )))
            }
            (TransactionKind::InternalTransfer, Some(to)) => Ok(TransactionLegs::InternalTransfer {
                from: from_account,
                to,
            }),
            (TransactionKind::CommissionPayout, _) => Err(LedgerError::Validation(
                "COMMISSION_PAYOUT transactions are created by the payout engine".into(),
            )),
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionLegs::Deposit { .. } => TransactionKind::Deposit,
            TransactionLegs::Withdrawal { .. } => TransactionKind::Withdrawal,
            TransactionLegs::InternalTransfer { .. } => TransactionKind::InternalTransfer,
            TransactionLegs::CommissionPayout { .. } => TransactionKind::CommissionPayout,
        }
    }

    /// Every account the transaction touches, in leg order
    pub fn accounts(&self) -> Vec<AccountId> {
        match *self {
            TransactionLegs::Deposit { account } | TransactionLegs::Withdrawal { account } => {
                vec![account]
            }
            TransactionLegs::InternalTransfer { from, to } => vec![from, to],
            TransactionLegs::CommissionPayout {
                pool, ib_account, ..
            } => vec![pool, ib_account],
        }
    }

    /// The client account whose balance funds the transaction, if any
    ///
    /// The commission pool is a house account and is never funds-checked.
    pub fn funding_account(&self) -> Option<AccountId> {
        match *self {
            TransactionLegs::Withdrawal { account } => Some(account),
            TransactionLegs::InternalTransfer { from, .. } => Some(from),
            TransactionLegs::Deposit { .. } | TransactionLegs::CommissionPayout { .. } => None,
        }
    }

    /// Ledger entries this transaction commits when approved
    pub fn entries(
        &self,
        amount: Decimal,
        currency: Currency,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> Vec<LedgerEntry> {
        match *self {
            TransactionLegs::Deposit { account } => vec![LedgerEntry::credit(
                account,
                amount,
                currency,
                EntryKind::Deposit,
                transaction_id,
                at,
            )],
            TransactionLegs::Withdrawal { account } => vec![LedgerEntry::debit(
                account,
                amount,
                currency,
                EntryKind::Withdrawal,
                transaction_id,
                at,
            )],
            TransactionLegs::InternalTransfer { from, to } => vec![
                LedgerEntry::debit(from, amount, currency, EntryKind::TransferOut, transaction_id, at),
                LedgerEntry::credit(to, amount, currency, EntryKind::TransferIn, transaction_id, at),
            ],
            TransactionLegs::CommissionPayout {
                pool, ib_account, ..
            } => vec![
                LedgerEntry::debit(pool, amount, currency, EntryKind::Commission, transaction_id, at),
                LedgerEntry::credit(
                    ib_account,
                    amount,
                    currency,
                    EntryKind::Commission,
                    transaction_id,
                    at,
                ),
            ],
        }
    }
}

/// Outcome of an approve or reject action, written atomically with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finalization {
    pub status: TransactionStatus,
    pub actor_id: String,
    pub idempotency_key: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl Finalization {
    pub fn completed(
        actor_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: TransactionStatus::Completed,
            actor_id: actor_id.into(),
            idempotency_key: idempotency_key.into(),
            reason: None,
            at,
        }
    }

    pub fn rejected(
        actor_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: TransactionStatus::Rejected,
            actor_id: actor_id.into(),
            idempotency_key: idempotency_key.into(),
            reason: Some(reason.into()),
            at,
        }
    }
}

/// Create request as it arrives from the handler layer
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub from_account: AccountId,
    pub to_account: Option<AccountId>,
    pub amount: Decimal,
    /// Payment method label (bank wire, card, crypto, ...)
    pub method: String,
    pub details: Option<String>,
}

impl TransactionRequest {
    pub fn deposit(account: AccountId, amount: Decimal, method: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            from_account: account,
            to_account: None,
            amount,
            method: method.into(),
            details: None,
        }
    }

    pub fn withdrawal(account: AccountId, amount: Decimal, method: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Withdrawal,
            from_account: account,
            to_account: None,
            amount,
            method: method.into(),
            details: None,
        }
    }

    pub fn transfer(from: AccountId, to: AccountId, amount: Decimal) -> Self {
        Self {
            kind: TransactionKind::InternalTransfer,
            from_account: from,
            to_account: Some(to),
            amount,
            method: "internal".to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub legs: TransactionLegs,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Key of the action that finalized the transaction
    pub idempotency_key: Option<String>,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
}

impl Transaction {
    /// Create a new PENDING transaction
    pub fn pending(
        legs: TransactionLegs,
        amount: Decimal,
        currency: Currency,
        method: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            legs,
            status: TransactionStatus::Pending,
            amount,
            currency,
            method: method.into(),
            details,
            created_at: now,
            updated_at: now,
            idempotency_key: None,
            actor_id: None,
            reason: None,
        }
    }

    #[inline]
    pub fn kind(&self) -> TransactionKind {
        self.legs.kind()
    }

    /// Apply a finalization in place (store backends call this under CAS)
    pub fn finalize(&mut self, finalization: &Finalization) {
        self.status = finalization.status;
        self.actor_id = Some(finalization.actor_id.clone());
        self.idempotency_key = Some(finalization.idempotency_key.clone());
        self.reason = finalization.reason.clone();
        self.updated_at = finalization.at;
    }

    /// Whether `key` is the key that finalized this transaction into `status`
    pub fn finalized_with(&self, status: TransactionStatus, key: &str) -> bool {
        self.status == status && self.idempotency_key.as_deref() == Some(key)
    }

    /// Number of ledger entries a COMPLETED transaction of this kind owns
    pub fn expected_entry_count(&self) -> usize {
        match self.status {
            TransactionStatus::Completed => self.legs.accounts().len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[{}] {} {} {} accounts={:?} status={}",
            self.id,
            self.kind(),
            self.amount,
            self.currency,
            self.legs.accounts(),
            self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_legs_from_request() {
        let legs =
            TransactionLegs::from_request(TransactionKind::Deposit, AccountId(1), None).unwrap();
        assert_eq!(legs, TransactionLegs::Deposit { account: AccountId(1) });

        let legs = TransactionLegs::from_request(
            TransactionKind::InternalTransfer,
            AccountId(1),
            Some(AccountId(2)),
        )
        .unwrap();
        assert_eq!(legs.accounts(), vec![AccountId(1), AccountId(2)]);
        assert_eq!(legs.funding_account(), Some(AccountId(1)));
    }

    #[test]
    fn test_legs_reject_illegal_shapes() {
        assert!(matches!(
            TransactionLegs::from_request(TransactionKind::InternalTransfer, AccountId(1), None),
            Err(LedgerError::Validation(_))
        ));
        assert!(matches!(
            TransactionLegs::from_request(
                TransactionKind::InternalTransfer,
                AccountId(1),
                Some(AccountId(1))
            ),
            Err(LedgerError::InvalidTransfer(_))
        ));
        assert!(matches!(
            TransactionLegs::from_request(TransactionKind::Deposit, AccountId(1), Some(AccountId(2))),
            Err(LedgerError::Validation(_))
        ));
        assert!(
            TransactionLegs::from_request(TransactionKind::CommissionPayout, AccountId(1), None)
                .is_err()
        );
    }

    #[test]
    fn test_entries_per_kind() {
        let txn = TransactionId::new();
        let now = Utc::now();

        let deposit = TransactionLegs::Deposit { account: AccountId(1) };
        let entries = deposit.entries(dec(500), Currency::USD, txn, now);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, dec(500));
        assert_eq!(entries[0].kind, EntryKind::Deposit);

        let withdrawal = TransactionLegs::Withdrawal { account: AccountId(1) };
        let entries = withdrawal.entries(dec(20), Currency::USD, txn, now);
        assert_eq!(entries[0].amount, dec(-20));

        let transfer = TransactionLegs::InternalTransfer {
            from: AccountId(1),
            to: AccountId(2),
        };
        let entries = transfer.entries(dec(75), Currency::USD, txn, now);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].account_id, AccountId(1));
        assert_eq!(entries[0].amount, dec(-75));
        assert_eq!(entries[1].account_id, AccountId(2));
        assert_eq!(entries[1].amount, dec(75));
        assert!(entries.iter().all(|e| e.transaction_id == txn));
    }

    #[test]
    fn test_finalize_records_actor_and_key() {
        let mut txn = Transaction::pending(
            TransactionLegs::Deposit { account: AccountId(1) },
            dec(10),
            Currency::USD,
            "wire",
            None,
        );
        assert_eq!(txn.expected_entry_count(), 0);

        let fin = Finalization::completed("admin-7", "k-1", Utc::now());
        txn.finalize(&fin);
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.actor_id.as_deref(), Some("admin-7"));
        assert!(txn.finalized_with(TransactionStatus::Completed, "k-1"));
        assert!(!txn.finalized_with(TransactionStatus::Completed, "k-2"));
        assert_eq!(txn.expected_entry_count(), 1);
    }

    #[test]
    fn test_legs_serde_is_tagged() {
        let legs = TransactionLegs::InternalTransfer {
            from: AccountId(1),
            to: AccountId(2),
        };
        let json = serde_json::to_value(legs).unwrap();
        assert_eq!(json["kind"], "INTERNAL_TRANSFER");
        assert_eq!(json["from"], 1);
        assert_eq!(json["to"], 2);
    }
}
