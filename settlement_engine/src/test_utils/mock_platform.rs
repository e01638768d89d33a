use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::Utc;

use crate::{
    db_types::{ItemId, OrderId, ORDER_ACTIVE_STATUSES},
    traits::{ActiveOrder, AdParams, OrderDetails, PlatformChatMessage, PlatformError, TradingPlatform},
};

#[derive(Default)]
struct MockState {
    next_item: u64,
    /// item_id -> (account_id, params, active)
    ads: HashMap<ItemId, (String, AdParams, bool)>,
    orders: HashMap<OrderId, OrderDetails>,
    /// account_id -> orders visible in the active-orders listing
    listings: HashMap<String, Vec<ActiveOrder>>,
    chats: HashMap<OrderId, Vec<PlatformChatMessage>>,
    released: Vec<OrderId>,
    /// Orders whose release is scripted to fail.
    failing_releases: HashSet<OrderId>,
    /// Accounts whose live ad-count fetch is scripted to fail.
    failing_counts: HashSet<String>,
    /// Scripted live ad-count overrides, simulating platform-side drift.
    count_overrides: HashMap<String, usize>,
    /// order_id -> number of detail fetches served, for asserting how often callers re-check.
    detail_calls: HashMap<OrderId, usize>,
}

/// An in-memory [`TradingPlatform`] for tests. Every call is recorded; failures and platform-side drift are
/// scripted through the `fail_*` and `set_*` methods.
#[derive(Clone, Default)]
pub struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock platform lock poisoned")
    }

    /// Registers a live order, visible both through the account listing and the detail endpoint.
    pub fn add_order(&self, account_id: &str, order_id: &OrderId, item_id: Option<ItemId>, price: pse_common::Rub) {
        let mut state = self.lock();
        let details = OrderDetails {
            order_id: order_id.clone(),
            item_id: item_id.clone(),
            status: ORDER_ACTIVE_STATUSES[0],
            price,
            created_at: Utc::now(),
        };
        state.orders.insert(order_id.clone(), details);
        state
            .listings
            .entry(account_id.to_string())
            .or_default()
            .push(ActiveOrder { order_id: order_id.clone(), item_id, status: ORDER_ACTIVE_STATUSES[0], price });
    }

    pub fn set_order_status(&self, order_id: &OrderId, status: i64) {
        let mut state = self.lock();
        if let Some(details) = state.orders.get_mut(order_id) {
            details.status = status;
        }
        for listing in state.listings.values_mut() {
            for order in listing.iter_mut().filter(|o| &o.order_id == order_id) {
                order.status = status;
            }
        }
    }

    pub fn add_chat_message(&self, order_id: &OrderId, external_id: &str, sender_id: &str, content: &str) {
        self.lock().chats.entry(order_id.clone()).or_default().push(PlatformChatMessage {
            external_id: external_id.to_string(),
            order_id: order_id.clone(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn fail_release_for(&self, order_id: &OrderId) {
        self.lock().failing_releases.insert(order_id.clone());
    }

    pub fn fail_count_for(&self, account_id: &str) {
        self.lock().failing_counts.insert(account_id.to_string());
    }

    /// Overrides the live ad count for an account, e.g. to simulate ads created outside the engine.
    pub fn set_live_ad_count(&self, account_id: &str, count: usize) {
        self.lock().count_overrides.insert(account_id.to_string(), count);
    }

    pub fn released_orders(&self) -> Vec<OrderId> {
        self.lock().released.clone()
    }

    pub fn created_ad_count(&self) -> usize {
        self.lock().ads.len()
    }

    pub fn is_ad_active(&self, item_id: &ItemId) -> bool {
        self.lock().ads.get(item_id).map(|(_, _, active)| *active).unwrap_or(false)
    }

    /// How many times the detail endpoint was hit for this order.
    pub fn order_detail_calls(&self, order_id: &OrderId) -> usize {
        self.lock().detail_calls.get(order_id).copied().unwrap_or(0)
    }
}

impl TradingPlatform for MockPlatform {
    async fn create_advertisement(&self, params: &AdParams) -> Result<ItemId, PlatformError> {
        let mut state = self.lock();
        state.next_item += 1;
        let item_id = ItemId(format!("mock-item-{}", state.next_item));
        state.ads.insert(item_id.clone(), (params.account_id.clone(), params.clone(), true));
        Ok(item_id)
    }

    async fn cancel_advertisement(&self, item_id: &ItemId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        match state.ads.get_mut(item_id) {
            Some((_, _, active)) => {
                *active = false;
                Ok(())
            },
            None => Err(PlatformError::NotFound(format!("advertisement {item_id}"))),
        }
    }

    async fn get_order_details(&self, order_id: &OrderId) -> Result<OrderDetails, PlatformError> {
        let mut state = self.lock();
        *state.detail_calls.entry(order_id.clone()).or_default() += 1;
        state.orders.get(order_id).cloned().ok_or_else(|| PlatformError::NotFound(format!("order {order_id}")))
    }

    async fn list_active_orders(&self, account_id: &str) -> Result<Vec<ActiveOrder>, PlatformError> {
        Ok(self.lock().listings.get(account_id).cloned().unwrap_or_default())
    }

    async fn get_chat_messages(&self, order_id: &OrderId) -> Result<Vec<PlatformChatMessage>, PlatformError> {
        Ok(self.lock().chats.get(order_id).cloned().unwrap_or_default())
    }

    async fn release_funds(&self, order_id: &OrderId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.failing_releases.contains(order_id) {
            return Err(PlatformError::Api(format!("release rejected for order {order_id}")));
        }
        if !state.orders.contains_key(order_id) {
            return Err(PlatformError::NotFound(format!("order {order_id}")));
        }
        if !state.released.contains(order_id) {
            state.released.push(order_id.clone());
        }
        Ok(())
    }

    async fn count_active_ads(&self, account_id: &str) -> Result<usize, PlatformError> {
        let state = self.lock();
        if state.failing_counts.contains(account_id) {
            return Err(PlatformError::Transport(format!("live count unavailable for account {account_id}")));
        }
        if let Some(count) = state.count_overrides.get(account_id) {
            return Ok(*count);
        }
        let count = state.ads.values().filter(|(account, _, active)| account == account_id && *active).count();
        Ok(count)
    }
}
