//! End-to-end ledger scenarios against the in-memory store

mod common;

use std::sync::Arc;

use common::{dec, harness};
use fxledger::{LedgerError, TransactionRequest, TransactionStatus};
use rust_decimal::Decimal;

#[tokio::test]
async fn deposit_approval_credits_once() {
    let h = harness().await;
    let acct = h.open(1001).await;
    h.fund(acct, dec(1000)).await;

    let txn = h
        .services
        .transactions
        .create_pending(TransactionRequest::deposit(acct, dec(500), "card"))
        .await
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert_eq!(h.balance(acct).await, dec(1000));

    let approval = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", None)
        .await
        .unwrap();

    assert_eq!(approval.transaction.status, TransactionStatus::Completed);
    assert_eq!(approval.committed_entries.len(), 1);
    assert_eq!(approval.committed_entries[0].amount, dec(500));
    assert_eq!(h.balance(acct).await, dec(1500));
}

#[tokio::test]
async fn insufficient_funds_leaves_transaction_pending() {
    let h = harness().await;
    let acct = h.open(1001).await;
    h.fund(acct, dec(500)).await;

    let first = h
        .services
        .transactions
        .create_pending(TransactionRequest::withdrawal(acct, dec(400), "bank_wire"))
        .await
        .unwrap();
    let second = h
        .services
        .transactions
        .create_pending(TransactionRequest::withdrawal(acct, dec(500), "bank_wire"))
        .await
        .unwrap();

    h.services
        .transactions
        .approve(first.id, "ops:alice", None)
        .await
        .unwrap();
    assert_eq!(h.balance(acct).await, dec(100));

    let err = h
        .services
        .transactions
        .approve(second.id, "ops:alice", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds { account: 1001, .. }
    ));

    let second = h.services.transactions.get(second.id).await.unwrap();
    assert_eq!(second.status, TransactionStatus::Pending);
    assert_eq!(h.balance(acct).await, dec(100));
    assert!(h.services.transactions.entries(second.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfer_race_has_exactly_one_winner() {
    let h = harness().await;
    let src = h.open(1).await;
    let dst_a = h.open(2).await;
    let dst_b = h.open(3).await;
    h.fund(src, dec(100)).await;

    let machine = h.services.transactions.clone();
    let a = machine
        .create_pending(TransactionRequest::transfer(src, dst_a, dec(100)))
        .await
        .unwrap();
    let b = machine
        .create_pending(TransactionRequest::transfer(src, dst_b, dec(100)))
        .await
        .unwrap();

    let m1 = Arc::clone(&machine);
    let m2 = Arc::clone(&machine);
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.approve(a.id, "ops:1", None).await }),
        tokio::spawn(async move { m2.approve(b.id, "ops:2", None).await }),
    );
    let results = [r1.unwrap(), r2.unwrap()];

    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
    );

    assert_eq!(h.balance(src).await, Decimal::ZERO);
    assert_eq!(h.balance(dst_a).await + h.balance(dst_b).await, dec(100));
}

#[tokio::test]
async fn failed_transfer_write_leaves_both_accounts_untouched() {
    let h = harness().await;
    let src = h.open(1).await;
    let dst = h.open(2).await;
    h.fund(src, dec(300)).await;
    let entries_before = h.store.entry_count();

    let txn = h
        .services
        .transactions
        .create_pending(TransactionRequest::transfer(src, dst, dec(120)))
        .await
        .unwrap();

    h.store.set_fail_mid_batch(true);
    let err = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert!(err.is_retryable());

    assert_eq!(h.store.entry_count(), entries_before);
    assert_eq!(h.balance(src).await, dec(300));
    assert_eq!(h.balance(dst).await, Decimal::ZERO);
    let stuck = h.services.transactions.get(txn.id).await.unwrap();
    assert_eq!(stuck.status, TransactionStatus::Processing);

    // retry with the same key once storage recovers
    h.store.set_fail_mid_batch(false);
    let approval = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", None)
        .await
        .unwrap();
    assert_eq!(approval.transaction.status, TransactionStatus::Completed);
    assert_eq!(h.balance(src).await, dec(180));
    assert_eq!(h.balance(dst).await, dec(120));
}

#[tokio::test]
async fn repeated_approval_key_credits_once() {
    let h = harness().await;
    let acct = h.open(1001).await;
    let txn = h
        .services
        .transactions
        .create_pending(TransactionRequest::deposit(acct, dec(250), "crypto"))
        .await
        .unwrap();

    let key = Some("approve-7f3a".to_string());
    let first = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", key.clone())
        .await
        .unwrap();
    let second = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", key)
        .await
        .unwrap();

    assert_eq!(first.transaction, second.transaction);
    assert_eq!(first.committed_entries, second.committed_entries);
    assert_eq!(h.balance(acct).await, dec(250));
    assert_eq!(h.services.transactions.entries(txn.id).await.unwrap().len(), 1);

    // a different key is a second approval, which is illegal
    let err = h
        .services
        .transactions
        .approve(txn.id, "ops:bob", Some("other".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
    assert_eq!(h.balance(acct).await, dec(250));
}

#[tokio::test]
async fn transfer_conserves_money() {
    let h = harness().await;
    let src = h.open(1).await;
    let dst = h.open(2).await;
    h.fund(src, dec(1000)).await;
    h.fund(dst, dec(50)).await;
    let total_before = h.balance(src).await + h.balance(dst).await;

    let txn = h
        .services
        .transactions
        .create_pending(TransactionRequest::transfer(src, dst, dec(375)))
        .await
        .unwrap();
    let approval = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", None)
        .await
        .unwrap();

    let net: Decimal = approval.committed_entries.iter().map(|e| e.amount).sum();
    assert_eq!(net, Decimal::ZERO);
    assert_eq!(h.balance(src).await, dec(625));
    assert_eq!(h.balance(dst).await, dec(425));
    assert_eq!(h.balance(src).await + h.balance(dst).await, total_before);
}

#[tokio::test]
async fn rejection_moves_no_money() {
    let h = harness().await;
    let acct = h.open(1001).await;
    h.fund(acct, dec(800)).await;
    let entries_before = h.store.entry_count();

    let txn = h
        .services
        .transactions
        .create_pending(TransactionRequest::withdrawal(acct, dec(300), "bank_wire"))
        .await
        .unwrap();
    let rejected = h
        .services
        .transactions
        .reject(txn.id, "compliance:carol", None, "source of funds unclear")
        .await
        .unwrap();

    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(rejected.reason.as_deref(), Some("source of funds unclear"));
    assert_eq!(h.balance(acct).await, dec(800));
    assert_eq!(h.store.entry_count(), entries_before);

    let err = h
        .services
        .transactions
        .approve(txn.id, "ops:alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn balance_always_equals_ledger_sum() {
    let h = harness().await;
    let a = h.open(1).await;
    let b = h.open(2).await;
    h.fund(a, dec(1000)).await;

    for amount in [100, 250, 40] {
        let txn = h
            .services
            .transactions
            .create_pending(TransactionRequest::transfer(a, b, dec(amount)))
            .await
            .unwrap();
        h.services
            .transactions
            .approve(txn.id, "ops:alice", None)
            .await
            .unwrap();
    }
    let w = h
        .services
        .transactions
        .create_pending(TransactionRequest::withdrawal(b, dec(90), "card"))
        .await
        .unwrap();
    h.services.transactions.approve(w.id, "ops:alice", None).await.unwrap();

    for id in [a, b] {
        let ledger = h.services.store.sum_for_account(id).await.unwrap();
        assert_eq!(h.balance(id).await, ledger);
    }
    assert_eq!(h.balance(a).await, dec(610));
    assert_eq!(h.balance(b).await, dec(300));

    let report = h
        .services
        .reconciliation_worker(std::time::Duration::from_secs(60))
        .reconcile(chrono::DateTime::UNIX_EPOCH)
        .await
        .unwrap();
    assert!(report.is_clean());
}
