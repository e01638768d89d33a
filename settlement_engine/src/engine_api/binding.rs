use std::time::Duration;

use chrono::Utc;
use log::*;
use pse_common::Rub;

use crate::{
    db_types::{ItemId, OrderId, Transaction, TransactionStatus, ORDER_ACTIVE_STATUSES},
    events::OrderCreatedEvent,
    traits::{SettlementDatabase, TradingPlatform},
};

use super::EngineError;

/// How long a transaction may sit without a counterparty before the stale sweep flags it for operator attention.
pub const DEFAULT_STALE_ORDER_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Result of a bind attempt.
#[derive(Debug, Clone)]
pub enum BindOutcome {
    /// The order id was attached and the transaction moved to `ChatStarted`.
    Bound(Transaction),
    /// An order id was already attached (this one or another). No-op.
    AlreadyBound,
    /// No local advertisement for the item id yet. The platform confirmation may still be in flight; the next
    /// sweep retries.
    AdvertNotFound,
}

/// `OrderBinderApi` attaches a live trade order to the transaction backing its advertisement, exactly once.
///
/// Two delivery paths feed it: platform push events ([`OrderCreatedEvent`]) and the periodic poll over active
/// orders. Both converge on [`bind_order`](Self::bind_order), whose guards make duplicate and racing deliveries
/// harmless.
pub struct OrderBinderApi<B, P> {
    db: B,
    platform: P,
}

impl<B, P> OrderBinderApi<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P) -> Self {
        Self { db, platform }
    }

    /// Binds `order_id` to the transaction behind `item_id`.
    ///
    /// The order id is written through a guarded one-shot assignment, then the status moves `Pending →
    /// ChatStarted` via CAS. A lost race on either step is absorbed: the other binder carried the same order id,
    /// so the end state is identical.
    pub async fn bind_order(
        &self,
        item_id: &ItemId,
        order_id: &OrderId,
        observed_price: Option<Rub>,
    ) -> Result<BindOutcome, EngineError> {
        let Some(ad) = self.db.fetch_advertisement(item_id).await? else {
            warn!("🔗 Order {order_id} references unknown advertisement [{item_id}]. Will retry next sweep.");
            return Ok(BindOutcome::AdvertNotFound);
        };
        let tx = self
            .db
            .fetch_transaction_for_payout(&ad.payout_id)
            .await?
            .ok_or_else(|| EngineError::PayoutNotFound(ad.payout_id.clone()))?;
        if let Some(existing) = &tx.order_id {
            if existing == order_id {
                trace!("🔗 Order {order_id} already bound to transaction [{}]. Nothing to do.", tx.id);
            } else {
                warn!(
                    "🔗 Transaction [{}] already carries order {existing}; refusing to bind {order_id} to it.",
                    tx.id
                );
            }
            return Ok(BindOutcome::AlreadyBound);
        }
        if let Some(price) = observed_price {
            if price != ad.price {
                warn!(
                    "🔗 Order {order_id} price {price} differs from advertisement [{item_id}] price {}. Binding \
                     anyway.",
                    ad.price
                );
            }
        }
        let Some(tx) = self.db.bind_order_id(tx.id, order_id).await? else {
            trace!("🔗 Lost the bind race for order {order_id}. Another binder got there first.");
            return Ok(BindOutcome::AlreadyBound);
        };
        info!("🔗 Order {order_id} bound to transaction [{}] for payout {}", tx.id, tx.payout_id);
        let tx = match self
            .db
            .update_status_cas(tx.id, TransactionStatus::Pending, TransactionStatus::ChatStarted)
            .await?
        {
            Some(updated) => updated,
            // The status already moved on (e.g. an early receipt match). The bind itself stands.
            None => tx,
        };
        Ok(BindOutcome::Bound(tx))
    }

    /// Push-path entry point.
    pub async fn handle_order_created(&self, event: &OrderCreatedEvent) -> Result<BindOutcome, EngineError> {
        debug!("🔗 Order-created event: order {} on advertisement [{}]", event.order_id, event.item_id);
        self.bind_order(&event.item_id, &event.order_id, Some(event.price)).await
    }

    /// Poll-path sweep: lists active orders on every account and binds the ones we do not know yet. The safety
    /// net for lost push events. Returns the number of newly bound orders.
    ///
    /// Per-account failures are logged and skipped so one unreachable account does not stall the sweep.
    pub async fn poll_sweep(&self) -> Result<usize, EngineError> {
        let accounts = self.db.fetch_active_accounts().await?;
        let mut bound = 0usize;
        for account in accounts {
            let orders = match self.platform.list_active_orders(&account.account_id).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!("🔗 Could not list orders for account {}: {e}. Skipping it this sweep.", account.account_id);
                    continue;
                },
            };
            for order in orders {
                if !ORDER_ACTIVE_STATUSES.contains(&order.status) {
                    continue;
                }
                if self.db.fetch_transaction_for_order(&order.order_id).await?.is_some() {
                    continue;
                }
                // Some list endpoints omit the item id; the detail fetch fills it in.
                let item_id = match order.item_id {
                    Some(item_id) => item_id,
                    None => match self.platform.get_order_details(&order.order_id).await {
                        Ok(details) => match details.item_id {
                            Some(item_id) => item_id,
                            None => {
                                warn!("🔗 Order {} has no advertisement id even in detail view.", order.order_id);
                                continue;
                            },
                        },
                        Err(e) => {
                            warn!("🔗 Could not fetch details for order {}: {e}", order.order_id);
                            continue;
                        },
                    },
                };
                if let BindOutcome::Bound(_) = self.bind_order(&item_id, &order.order_id, Some(order.price)).await? {
                    bound += 1;
                }
            }
        }
        if bound > 0 {
            info!("🔗 Poll sweep bound {bound} new order(s)");
        }
        Ok(bound)
    }

    /// Flags transactions older than `threshold` that still have no counterparty. Logged for operator attention;
    /// never auto-cancelled, since the advertisement may simply be unpopular.
    pub async fn flag_stale_unbound(&self, threshold: Duration) -> Result<Vec<Transaction>, EngineError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold.as_secs() as i64);
        let stale = self.db.fetch_stale_unbound(cutoff).await?;
        for tx in &stale {
            warn!(
                "🔗 Transaction [{}] for payout {} has had no order since {}. Operator attention suggested.",
                tx.id, tx.payout_id, tx.created_at
            );
        }
        Ok(stale)
    }
}
