use log::*;

use crate::{
    db_types::{ChatSender, OrderId, Transaction, TransactionStatus, ORDER_STATUS_APPEAL, ORDER_STATUS_CANCELLED},
    events::TransactionClosedEvent,
    helpers::contains_cancellation_phrase,
    traits::{SettlementDatabase, TradingPlatform},
};

use super::EngineError;

/// `CancellationApi` closes transactions whose order died under them.
///
/// The live platform order status is the only signal trusted on its own. Chat content is merely a tip-off:
/// counterparties quote, joke and change their minds, so a phrase hit triggers a live status re-check and is
/// dropped when the platform says the order is still active.
pub struct CancellationApi<B, P> {
    db: B,
    platform: P,
}

impl<B, P> CancellationApi<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P) -> Self {
        Self { db, platform }
    }

    /// One detection pass over every non-terminal transaction with a bound order. Per-transaction failures are
    /// logged and skipped. Returns the close events for newly cancelled transactions.
    pub async fn sweep(&self) -> Result<Vec<TransactionClosedEvent>, EngineError> {
        let transactions = self.db.fetch_bound_active_transactions().await?;
        let mut closed = Vec::new();
        for tx in transactions {
            match self.check_transaction(&tx).await {
                Ok(Some(cancelled)) => closed.push(TransactionClosedEvent { transaction: cancelled }),
                Ok(None) => {},
                Err(e) => warn!("🚫 Cancellation check for transaction [{}] failed: {e}. Continuing.", tx.id),
            }
        }
        if !closed.is_empty() {
            info!("🚫 Cancellation sweep closed {} transaction(s)", closed.len());
        }
        Ok(closed)
    }

    /// Checks one transaction. Returns the cancelled row when a cancellation was committed, `None` otherwise
    /// (still live, under appeal, or someone else terminated it first).
    pub async fn check_transaction(&self, tx: &Transaction) -> Result<Option<Transaction>, EngineError> {
        let Some(order_id) = &tx.order_id else {
            return Ok(None);
        };
        let details = self.platform.get_order_details(order_id).await?;
        if details.status == ORDER_STATUS_CANCELLED {
            debug!("🚫 Order {order_id} is cancelled on the platform.");
            return self.commit_cancellation(tx, "order cancelled on platform").await;
        }
        if details.status == ORDER_STATUS_APPEAL {
            // A dispute freezes the transaction rather than closing it. The CAS guard rejects the move from
            // stages where an appeal makes no sense.
            if let Some(appealed) =
                self.db.update_status_cas(tx.id, tx.status, TransactionStatus::Appeal).await?
            {
                warn!("🚫 Order {order_id} is under appeal. Transaction [{}] frozen for the operator.", appealed.id);
            }
            return Ok(None);
        }
        if self.chat_suggests_cancellation(tx, order_id).await? {
            // Chat said cancelled; the platform gets the final word.
            let fresh = self.platform.get_order_details(order_id).await?;
            if fresh.status == ORDER_STATUS_CANCELLED {
                debug!("🚫 Chat tip-off for order {order_id} confirmed by the platform.");
                return self.commit_cancellation(tx, "cancellation announced in chat and confirmed").await;
            }
            info!(
                "🚫 Chat for order {order_id} mentions cancellation but the order is still active (status {}). \
                 Ignoring.",
                fresh.status
            );
        }
        Ok(None)
    }

    /// Whether any counterparty chat message contains a cancellation phrase. Cached messages are scanned first;
    /// the live transcript is only pulled when nothing is cached yet.
    async fn chat_suggests_cancellation(&self, tx: &Transaction, order_id: &OrderId) -> Result<bool, EngineError> {
        let cached = self.db.fetch_chat_messages(tx.id).await?;
        if !cached.is_empty() {
            let hit = cached
                .iter()
                .any(|msg| msg.sender == ChatSender::Counterparty && contains_cancellation_phrase(&msg.body));
            return Ok(hit);
        }
        // On the live transcript our side is identified by the advertisement's account id; our own templated
        // messages must not count as a tip-off.
        let own_sender = self.db.fetch_advertisement(&tx.item_id).await?.map(|ad| ad.account_id);
        let live = self.platform.get_chat_messages(order_id).await?;
        Ok(live
            .iter()
            .filter(|msg| own_sender.as_deref() != Some(msg.sender_id.as_str()))
            .any(|msg| contains_cancellation_phrase(&msg.content)))
    }

    async fn commit_cancellation(&self, tx: &Transaction, reason: &str) -> Result<Option<Transaction>, EngineError> {
        match self.db.terminate_transaction(tx.id, TransactionStatus::Cancelled, Some(reason)).await? {
            Some(cancelled) => {
                info!("🚫 Transaction [{}] for payout {} cancelled: {reason}", cancelled.id, cancelled.payout_id);
                Ok(Some(cancelled))
            },
            None => {
                trace!("🚫 Transaction [{}] was already terminal. Nothing to do.", tx.id);
                Ok(None)
            },
        }
    }
}
