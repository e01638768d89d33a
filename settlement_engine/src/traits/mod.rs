//! Interface contracts of the engine's collaborators.
//!
//! * [`SettlementDatabase`] defines the storage behaviour a backend must expose: keyed upserts, guarded status
//!   updates and the sweep queries used by the reconciliation components.
//! * [`TradingPlatform`] defines the trading-platform (Bybit) client surface the engine calls. The HTTP client
//!   itself lives outside this crate; tests use the in-memory implementation from `test_utils`.
mod settlement_database;
mod trading_platform;

pub use settlement_database::{SettlementDatabase, SettlementDbError};
pub use trading_platform::{AdParams, ActiveOrder, OrderDetails, PlatformChatMessage, PlatformError, TradingPlatform};
