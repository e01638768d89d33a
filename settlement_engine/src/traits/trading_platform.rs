use std::future::Future;

use chrono::{DateTime, Utc};
use pse_common::Rub;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{ItemId, OrderId, PaymentMethod};

/// Parameters for creating a sell advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdParams {
    pub account_id: String,
    pub price: Rub,
    /// Crypto quantity as a decimal string. Exchange-rate computation is a collaborator concern.
    pub quantity: String,
    pub payment_method: PaymentMethod,
    pub remark: Option<String>,
}

/// Detail view of a single order, as returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: OrderId,
    /// The advertisement this order was opened against. The platform omits it in some list endpoints, hence the
    /// detail fetch in the poll path.
    pub item_id: Option<ItemId>,
    pub status: i64,
    pub price: Rub,
    pub created_at: DateTime<Utc>,
}

/// Summary row from the active-orders listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveOrder {
    pub order_id: OrderId,
    pub item_id: Option<ItemId>,
    pub status: i64,
    pub price: Rub,
}

/// One chat message as delivered by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformChatMessage {
    pub external_id: String,
    pub order_id: OrderId,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("Trading platform API error: {0}")]
    Api(String),
    #[error("Could not reach the trading platform: {0}")]
    Transport(String),
    #[error("The trading platform does not know about {0}")]
    NotFound(String),
}

/// The trading-platform client surface consumed by the engine.
///
/// Implementations wrap the platform's HTTP API and can use plain `async fn`s. The methods are declared in
/// desugared form with a `Send` bound so that daemon workers and event hooks, which are generic over the client,
/// can run the resulting futures on a multi-threaded runtime. Every method may block on the network; sweep
/// callers are responsible for isolating per-account failures so one slow account does not stall the rest of a
/// sweep.
pub trait TradingPlatform: Clone + Send + Sync {
    /// Posts a sell advertisement and returns the platform's id for it.
    fn create_advertisement(&self, params: &AdParams) -> impl Future<Output = Result<ItemId, PlatformError>> + Send;

    /// Takes an advertisement off the platform.
    fn cancel_advertisement(&self, item_id: &ItemId) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Fetches the detail view of an order, including its `item_id`.
    fn get_order_details(&self, order_id: &OrderId)
        -> impl Future<Output = Result<OrderDetails, PlatformError>> + Send;

    /// Lists orders in active status codes for one account.
    fn list_active_orders(&self, account_id: &str)
        -> impl Future<Output = Result<Vec<ActiveOrder>, PlatformError>> + Send;

    /// Fetches the full chat transcript for an order.
    fn get_chat_messages(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<Vec<PlatformChatMessage>, PlatformError>> + Send;

    /// Releases the escrowed funds for an order. Irreversible.
    fn release_funds(&self, order_id: &OrderId) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// The number of advertisements currently live on the platform for one account. Authoritative over any local
    /// count.
    fn count_active_ads(&self, account_id: &str) -> impl Future<Output = Result<usize, PlatformError>> + Send;
}
