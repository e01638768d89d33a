//! The engine public API: one struct per reconciliation concern, each generic over the storage backend
//! (and the trading-platform client where platform calls are made).
//!
//! * [`CapacityManager`] — picks a trading account with a free advertisement slot.
//! * [`AdvertApi`] — turns a payout into exactly one advertisement and one settlement transaction.
//! * [`OrderBinderApi`] — attaches a live order id to the right transaction, exactly once, from push and poll.
//! * [`ChatApi`] — records chat messages idempotently and advances the chat stage.
//! * [`ReceiptMatcherApi`] — links inbound bank receipts to waiting payouts.
//! * [`CancellationApi`] — detects cancellations from order status and chat content.
//! * [`ReleaseApi`] — releases escrowed funds after the safety delay and closes transactions.
mod advert;
mod binding;
mod cancellation;
mod capacity;
mod chat;
mod errors;
mod matching;
mod release;

pub use advert::{AdvertApi, IssueOutcome};
pub use binding::{BindOutcome, OrderBinderApi, DEFAULT_STALE_ORDER_THRESHOLD};
pub use cancellation::CancellationApi;
pub use capacity::{AccountSelection, CapacityManager, DEFAULT_LIVE_COUNT_TTL, MAX_ACTIVE_ADS_PER_ACCOUNT};
pub use chat::ChatApi;
pub use errors::EngineError;
pub use matching::{receipt_matches_payout, ReceiptMatcherApi, AMOUNT_TOLERANCE};
pub use release::{ReleaseApi, DEFAULT_RELEASE_DELAY};
