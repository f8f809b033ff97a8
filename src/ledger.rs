//! Ledger - append-only record of balance-affecting facts
//!
//! Every balance change is one immutable [`LedgerEntry`]. Entries are only
//! ever written as part of a [`CommitBatch`], which the store applies as a
//! single all-or-nothing unit together with the governing transaction write.
//! Corrections are new offsetting entries, never edits.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, AccrualId, EntryId, TransactionId};
use crate::error::LedgerError;
use crate::money::Currency;
use crate::transaction::{Finalization, Transaction, TransactionStatus};

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum EntryKind {
    Deposit = 1,
    Withdrawal = 2,
    TransferOut = 3,
    TransferIn = 4,
    Commission = 5,
}

impl EntryKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(EntryKind::Deposit),
            2 => Some(EntryKind::Withdrawal),
            3 => Some(EntryKind::TransferOut),
            4 => Some(EntryKind::TransferIn),
            5 => Some(EntryKind::Commission),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "DEPOSIT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::TransferOut => "TRANSFER_OUT",
            EntryKind::TransferIn => "TRANSFER_IN",
            EntryKind::Commission => "COMMISSION",
        }
    }

    /// Whether a signed amount is consistent with this kind
    fn accepts(&self, amount: Decimal) -> bool {
        match self {
            EntryKind::Deposit | EntryKind::TransferIn => amount.is_sign_positive(),
            EntryKind::Withdrawal | EntryKind::TransferOut => amount.is_sign_negative(),
            // pool debit and IB credit
            EntryKind::Commission => true,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry
///
/// `amount` is signed: credits are positive, debits negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub kind: EntryKind,
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,
    /// Set by the store when the batch holding this entry commits
    pub committed: bool,
}

impl LedgerEntry {
    /// Create an uncommitted entry
    pub fn new(
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        kind: EntryKind,
        transaction_id: TransactionId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            account_id,
            amount,
            currency,
            kind,
            transaction_id,
            created_at,
            committed: false,
        }
    }

    pub fn credit(
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        kind: EntryKind,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, amount.abs(), currency, kind, transaction_id, at)
    }

    pub fn debit(
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        kind: EntryKind,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(account_id, -amount.abs(), currency, kind, transaction_id, at)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry[{}] account={} {} {} {} txn={}",
            self.id, self.account_id, self.kind, self.amount, self.currency, self.transaction_id
        )
    }
}

/// How the governing transaction is written inside a batch
#[derive(Debug, Clone)]
pub enum TransactionWrite {
    /// CAS `expected -> finalization.status` on an existing transaction
    Finalize {
        id: TransactionId,
        expected: TransactionStatus,
        finalization: Finalization,
    },
    /// Insert a transaction that is born finalized (commission payouts)
    Insert(Transaction),
}

impl TransactionWrite {
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            TransactionWrite::Finalize { id, .. } => *id,
            TransactionWrite::Insert(txn) => txn.id,
        }
    }
}

/// Marks a commission accrual paid in the same atomic unit as its payout
#[derive(Debug, Clone)]
pub struct AccrualSettlement {
    pub accrual_id: AccrualId,
    pub transaction_id: TransactionId,
    pub idempotency_key: String,
    /// Accrual amount the payout was built from; the settlement misses if it moved
    pub expected_amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

/// One atomic unit: entries + transaction write (+ accrual settlement)
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub entries: Vec<LedgerEntry>,
    pub transaction: TransactionWrite,
    /// Accounts whose committed balance must stay non-negative after the batch
    pub no_overdraft: Vec<AccountId>,
    pub settle_accrual: Option<AccrualSettlement>,
}

impl CommitBatch {
    pub fn new(entries: Vec<LedgerEntry>, transaction: TransactionWrite) -> Self {
        Self {
            entries,
            transaction,
            no_overdraft: Vec::new(),
            settle_accrual: None,
        }
    }

    pub fn with_no_overdraft(mut self, accounts: impl IntoIterator<Item = AccountId>) -> Self {
        self.no_overdraft.extend(accounts);
        self
    }

    pub fn with_settlement(mut self, settlement: AccrualSettlement) -> Self {
        self.settle_accrual = Some(settlement);
        self
    }

    /// Structural checks every backend runs before touching storage
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.entries.is_empty() {
            return Err(LedgerError::Validation("empty ledger batch".into()));
        }

        let txn_id = self.transaction.transaction_id();
        for entry in &self.entries {
            if entry.transaction_id != txn_id {
                return Err(LedgerError::Validation(format!(
                    "entry {} references {} but batch governs {}",
                    entry.id, entry.transaction_id, txn_id
                )));
            }
            if entry.amount.is_zero() || !entry.kind.accepts(entry.amount) {
                return Err(LedgerError::Validation(format!(
                    "entry {} has amount {} inconsistent with {}",
                    entry.id, entry.amount, entry.kind
                )));
            }
            if entry.committed {
                return Err(LedgerError::Validation(format!(
                    "entry {} is already committed",
                    entry.id
                )));
            }
        }

        // Two-leg batches move money, they never create it.
        if self.entries.len() > 1 && !self.net().is_zero() {
            return Err(LedgerError::Validation(format!(
                "multi-leg batch for {} does not net to zero",
                txn_id
            )));
        }

        if let Some(settlement) = &self.settle_accrual
            && settlement.transaction_id != txn_id
        {
            return Err(LedgerError::Validation(
                "accrual settlement references a different transaction".into(),
            ));
        }

        Ok(())
    }

    /// Sum of all entry amounts
    pub fn net(&self) -> Decimal {
        self.entries.iter().map(|e| e.amount).sum()
    }

    /// Per-account balance delta of this batch
    pub fn deltas(&self) -> HashMap<AccountId, Decimal> {
        let mut deltas: HashMap<AccountId, Decimal> = HashMap::new();
        for entry in &self.entries {
            *deltas.entry(entry.account_id).or_default() += entry.amount;
        }
        deltas
    }
}

/// Result of a successful append
#[derive(Debug, Clone)]
pub struct Committed {
    pub transaction: Transaction,
    pub entries: Vec<LedgerEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionStatus;

    fn finalize(id: TransactionId) -> TransactionWrite {
        TransactionWrite::Finalize {
            id,
            expected: TransactionStatus::Processing,
            finalization: Finalization::completed("admin-1", "k", Utc::now()),
        }
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_entry_kind_roundtrip() {
        for kind in [
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::TransferOut,
            EntryKind::TransferIn,
            EntryKind::Commission,
        ] {
            assert_eq!(EntryKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(EntryKind::from_id(0), None);
        assert_eq!(EntryKind::TransferOut.to_string(), "TRANSFER_OUT");
    }

    #[test]
    fn test_debit_credit_signs() {
        let txn = TransactionId::new();
        let now = Utc::now();
        let d = LedgerEntry::debit(AccountId(1), dec(5), Currency::USD, EntryKind::Withdrawal, txn, now);
        let c = LedgerEntry::credit(AccountId(1), dec(-5), Currency::USD, EntryKind::Deposit, txn, now);
        assert_eq!(d.amount, dec(-5));
        assert_eq!(c.amount, dec(5));
        assert!(!d.committed);
    }

    #[test]
    fn test_transfer_batch_validates() {
        let txn = TransactionId::new();
        let now = Utc::now();
        let batch = CommitBatch::new(
            vec![
                LedgerEntry::debit(AccountId(1), dec(40), Currency::USD, EntryKind::TransferOut, txn, now),
                LedgerEntry::credit(AccountId(2), dec(40), Currency::USD, EntryKind::TransferIn, txn, now),
            ],
            finalize(txn),
        );
        assert!(batch.validate().is_ok());
        assert!(batch.net().is_zero());

        let deltas = batch.deltas();
        assert_eq!(deltas[&AccountId(1)], dec(-40));
        assert_eq!(deltas[&AccountId(2)], dec(40));
    }

    #[test]
    fn test_batch_rejects_unbalanced_legs() {
        let txn = TransactionId::new();
        let now = Utc::now();
        let batch = CommitBatch::new(
            vec![
                LedgerEntry::debit(AccountId(1), dec(40), Currency::USD, EntryKind::TransferOut, txn, now),
                LedgerEntry::credit(AccountId(2), dec(41), Currency::USD, EntryKind::TransferIn, txn, now),
            ],
            finalize(txn),
        );
        assert!(matches!(batch.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_batch_rejects_foreign_entries_and_bad_signs() {
        let txn = TransactionId::new();
        let now = Utc::now();

        let foreign = CommitBatch::new(
            vec![LedgerEntry::credit(
                AccountId(1),
                dec(1),
                Currency::USD,
                EntryKind::Deposit,
                TransactionId::new(),
                now,
            )],
            finalize(txn),
        );
        assert!(foreign.validate().is_err());

        let wrong_sign = CommitBatch::new(
            vec![LedgerEntry::credit(AccountId(1), dec(1), Currency::USD, EntryKind::Withdrawal, txn, now)],
            finalize(txn),
        );
        assert!(wrong_sign.validate().is_err());

        let empty = CommitBatch::new(vec![], finalize(txn));
        assert!(empty.validate().is_err());
    }
}
