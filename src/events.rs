//! Transaction transition events
//!
//! Notification and audit-log services consume [`TransitionEvent`]s through
//! [`EventSink`]. Publishing is fire-and-forget: a failing sink is logged and
//! never fails the command that produced the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core_types::{AccountId, TransactionId};
use crate::money::Currency;
use crate::transaction::{Transaction, TransactionKind, TransactionStatus};

/// One status change of a transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub transaction_id: TransactionId,
    pub kind: TransactionKind,
    /// `None` when the transaction was created
    pub from: Option<TransactionStatus>,
    pub to: TransactionStatus,
    pub accounts: Vec<AccountId>,
    pub amount: Decimal,
    pub currency: Currency,
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn for_transaction(txn: &Transaction, from: Option<TransactionStatus>) -> Self {
        Self {
            transaction_id: txn.id,
            kind: txn.kind(),
            from,
            to: txn.status,
            accounts: txn.legs.accounts(),
            amount: txn.amount,
            currency: txn.currency,
            actor_id: txn.actor_id.clone(),
            reason: txn.reason.clone(),
            at: txn.updated_at,
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,
    #[error("sink full, event dropped")]
    Full,
}

/// Consumer of transition events
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hand the event over without blocking
    fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError>;
}

/// Audit sink: one structured log line per transition under target `audit`
pub struct TracingSink;

impl EventSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError> {
        info!(
            target: "audit",
            transaction_id = %event.transaction_id,
            kind = %event.kind,
            from = event.from.map(|s| s.as_str()).unwrap_or("-"),
            to = %event.to,
            accounts = ?event.accounts,
            amount = %event.amount,
            currency = %event.currency,
            actor = event.actor_id.as_deref().unwrap_or("-"),
            reason = event.reason.as_deref().unwrap_or(""),
            "transaction transition"
        );
        Ok(())
    }
}

/// Forwards events to a bounded channel (notification service bridge)
pub struct ChannelSink {
    tx: mpsc::Sender<TransitionEvent>,
}

impl ChannelSink {
    /// Create the sink and the receiving end
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransitionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn publish(&self, event: &TransitionEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Fan-out over all registered sinks
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn publish(&self, event: TransitionEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&event) {
                warn!(
                    sink = sink.name(),
                    transaction_id = %event.transaction_id,
                    error = %e,
                    "Event sink failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionLegs;

    fn event() -> TransitionEvent {
        let txn = Transaction::pending(
            TransactionLegs::Deposit { account: AccountId(1) },
            Decimal::new(500, 0),
            Currency::USD,
            "wire",
            None,
        );
        TransitionEvent::for_transaction(&txn, None)
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new(4);
        let bus = EventBus::new()
            .with_sink(Arc::new(TracingSink))
            .with_sink(Arc::new(sink));

        let ev = event();
        bus.publish(ev.clone());
        assert_eq!(rx.recv().await, Some(ev));
    }

    #[test]
    fn test_full_channel_does_not_fail_publisher() {
        let (sink, _rx) = ChannelSink::new(1);
        assert!(sink.publish(&event()).is_ok());
        assert!(matches!(sink.publish(&event()), Err(SinkError::Full)));

        // The bus swallows the error.
        let bus = EventBus::new().with_sink(Arc::new(sink));
        bus.publish(event());
    }

    #[test]
    fn test_closed_channel() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        assert!(matches!(sink.publish(&event()), Err(SinkError::Closed)));
    }
}
