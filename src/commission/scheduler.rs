//! Payout Scheduler
//!
//! Background worker that pays out unpaid accruals of closed periods on the
//! configured day of the month.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, error, info, warn};

use super::engine::CommissionEngine;
use super::models::{Payout, Period};
use crate::error::LedgerResult;

/// Actor recorded on scheduled payouts
pub const SCHEDULER_ACTOR: &str = "system:payout-scheduler";

pub struct PayoutScheduler {
    engine: Arc<CommissionEngine>,
    check_interval: Duration,
}

impl PayoutScheduler {
    pub fn new(engine: Arc<CommissionEngine>, check_interval: Duration) -> Self {
        Self {
            engine,
            check_interval,
        }
    }

    /// Run forever, checking once per interval whether today is payout day
    pub async fn run(&self) -> ! {
        info!(
            payout_day = self.engine.policy().payout_day,
            check_interval_secs = self.check_interval.as_secs(),
            "Starting payout scheduler"
        );

        loop {
            if let Err(e) = self.run_once(Utc::now()).await {
                error!(error = %e, "Payout run failed");
            }
            tokio::time::sleep(self.check_interval).await;
        }
    }

    /// Pay every due accrual if `now` falls on payout day
    ///
    /// Each accrual uses its default payout key, so repeated runs on the
    /// same day (or after a restart) never pay twice.
    pub async fn run_once(&self, now: DateTime<Utc>) -> LedgerResult<Vec<Payout>> {
        if now.day() != self.engine.policy().payout_day {
            debug!(day = now.day(), "Not payout day");
            return Ok(Vec::new());
        }

        let due = self.engine.due_accruals(Period::of(now)).await?;
        if due.is_empty() {
            debug!("No accruals due");
            return Ok(Vec::new());
        }
        info!(count = due.len(), "Paying due commission accruals");

        let mut paid = Vec::with_capacity(due.len());
        for accrual in due {
            match self
                .engine
                .process_payout(accrual.id, SCHEDULER_ACTOR, None)
                .await
            {
                Ok(payout) => paid.push(payout),
                Err(e) => {
                    warn!(
                        accrual_id = %accrual.id,
                        ib_id = %accrual.ib_id,
                        error = %e,
                        "Scheduled payout failed"
                    );
                }
            }
        }

        info!(count = paid.len(), "Scheduled payouts completed");
        Ok(paid)
    }
}
