//! P2P Settlement Reconciliation Engine
//!
//! This library reconciles four independent, eventually-consistent views of the same real-world trade:
//! a payout feed from the settlement platform ("Gate"), the advertisement/order lifecycle on the trading
//! platform ("Bybit"), the trade-order chat transcript, and parsed bank-transfer receipts arriving by email.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    use the engine APIs instead. The exception is the data types used in the database, which are defined in
//!    the [`db_types`] module and are public.
//! 2. The engine public API ([`mod@engine_api`]). One API struct per reconciliation concern: account capacity,
//!    advertisement issuance, order binding, receipt matching, cancellation detection and fund release. Backends
//!    implement the traits in [`mod@traits`] to act as storage or as the trading-platform client.
//! 3. An event hook system ([`mod@events`]) used both to deliver platform push events (order created, chat
//!    message) into the engine and to notify subscribers of engine outcomes (receipt matched, transaction
//!    completed).
//!
//! Every mutating operation is safe under at-least-once delivery: inserts are keyed upserts, and status
//! transitions are single conditional updates guarded by the current status.
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use engine_api::{
    AdvertApi,
    BindOutcome,
    CancellationApi,
    CapacityManager,
    ChatApi,
    EngineError,
    IssueOutcome,
    OrderBinderApi,
    ReceiptMatcherApi,
    ReleaseApi,
};
pub use traits::{SettlementDatabase, SettlementDbError, TradingPlatform};
