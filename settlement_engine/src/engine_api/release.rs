use std::time::Duration;

use log::*;

use crate::{
    db_types::{Transaction, TransactionStatus},
    events::TransactionClosedEvent,
    traits::{SettlementDatabase, TradingPlatform},
};

use super::EngineError;

/// Safety window between the payment-confirmed moment and the irreversible funds release. Long enough for a
/// cancellation or chargeback signal to land, short enough not to annoy counterparties.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_secs(2 * 60);

/// `ReleaseApi` performs the one irreversible step of the whole workflow: releasing escrowed crypto to the
/// counterparty.
///
/// A transaction is claimed through a CAS into `ReleaseMoney` before the platform call, so two workers sweeping
/// the same candidate release at most once. A failed platform release parks the transaction in `Failed` for the
/// operator; it is never retried automatically.
pub struct ReleaseApi<B, P> {
    db: B,
    platform: P,
}

impl<B, P> ReleaseApi<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P) -> Self {
        Self { db, platform }
    }

    /// One release pass: every transaction whose receipt/approval timestamp is older than `delay` is released.
    /// Per-transaction failures are logged and skipped. Returns close events for every transaction that reached
    /// a terminal state (`Completed` or `Failed`).
    pub async fn sweep(&self, delay: Duration) -> Result<Vec<TransactionClosedEvent>, EngineError> {
        let candidates = self.db.fetch_release_candidates(chrono::Duration::seconds(delay.as_secs() as i64)).await?;
        let mut closed = Vec::new();
        for tx in candidates {
            let id = tx.id;
            match self.release_transaction(tx).await {
                Ok(Some(terminal)) => closed.push(TransactionClosedEvent { transaction: terminal }),
                Ok(None) => {},
                Err(e) => warn!("💰 Releasing transaction [{id}] failed: {e}. Continuing the sweep."),
            }
        }
        if !closed.is_empty() {
            info!("💰 Release sweep closed {} transaction(s)", closed.len());
        }
        Ok(closed)
    }

    /// Operator override: releases one transaction immediately, skipping the delay but honoring every other
    /// guard. Fails with [`EngineError::NotReleasable`] when the transaction is not in a releasable stage.
    pub async fn force_release(&self, transaction_id: i64) -> Result<Transaction, EngineError> {
        let tx = self
            .db
            .fetch_transaction(transaction_id)
            .await?
            .ok_or(EngineError::TransactionNotFound(transaction_id))?;
        if !matches!(
            tx.status,
            TransactionStatus::ReceiptReceived | TransactionStatus::PaymentReceived | TransactionStatus::ReleaseMoney
        ) {
            return Err(EngineError::NotReleasable(transaction_id));
        }
        warn!("💰 Operator forced release of transaction [{transaction_id}] (status {})", tx.status);
        self.release_transaction(tx).await?.ok_or(EngineError::NotReleasable(transaction_id))
    }

    /// Claims and releases one transaction. Returns the terminal row (`Completed`, or `Failed` when the platform
    /// call failed), or `None` when the claim was lost or the transaction cannot be released yet.
    async fn release_transaction(&self, tx: Transaction) -> Result<Option<Transaction>, EngineError> {
        let Some(order_id) = tx.order_id.clone() else {
            // A receipt can match before any counterparty engages. Without an order there is nothing to
            // release; the transaction stays queued until the binder catches up.
            debug!("💰 Transaction [{}] has a receipt but no order yet. Deferring release.", tx.id);
            return Ok(None);
        };
        let claimed = if tx.status == TransactionStatus::ReleaseMoney {
            // A previous attempt crashed between claim and release. Safe to resume: the platform call is
            // idempotent on an already-released order.
            tx
        } else {
            match self.db.update_status_cas(tx.id, tx.status, TransactionStatus::ReleaseMoney).await? {
                Some(claimed) => claimed,
                None => {
                    trace!("💰 Transaction [{}] was claimed by another worker. Skipping.", tx.id);
                    return Ok(None);
                },
            }
        };
        match self.platform.release_funds(&order_id).await {
            Ok(()) => {
                info!("💰 Funds released for order {order_id} (transaction [{}])", claimed.id);
                let completed = self
                    .db
                    .update_status_cas(claimed.id, TransactionStatus::ReleaseMoney, TransactionStatus::Completed)
                    .await?;
                Ok(completed)
            },
            Err(e) => {
                error!("💰 Platform refused to release funds for order {order_id}: {e}");
                let reason = format!("funds release failed: {e}");
                let failed =
                    self.db.terminate_transaction(claimed.id, TransactionStatus::Failed, Some(&reason)).await?;
                Ok(failed)
            },
        }
    }
}
