use chrono::{DateTime, Utc};
use pse_common::Rub;
use serde::{Deserialize, Serialize};

use crate::db_types::{ItemId, OrderId, PayoutId, Receipt, Transaction};

/// Platform push event: a counterparty opened a trade order against one of our advertisements.
///
/// This is the push half of the dual push/poll order binding; both halves converge on the same idempotent
/// `bind_order` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub item_id: ItemId,
    pub order_id: OrderId,
    pub price: Rub,
}

/// Platform push event: a new message arrived on a trade-order chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageEvent {
    pub order_id: OrderId,
    pub external_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Engine event: a receipt was matched to a payout and the transaction advanced to `ReceiptReceived`.
#[derive(Debug, Clone)]
pub struct ReceiptMatchedEvent {
    pub receipt: Receipt,
    pub payout_id: PayoutId,
    pub transaction: Transaction,
}

/// Engine event: a transaction reached a terminal state.
#[derive(Debug, Clone)]
pub struct TransactionClosedEvent {
    pub transaction: Transaction,
}
