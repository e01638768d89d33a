use pse_common::Rub;
use thiserror::Error;

use crate::{
    db_types::PayoutId,
    traits::{PlatformError, SettlementDbError},
};

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Validation failure, rejected before any side effect.
    #[error("The payout wallet {0} is blacklisted")]
    BlacklistedWallet(String),
    /// Validation failure, rejected before any side effect.
    #[error("Invalid payout amount: {0}")]
    InvalidAmount(Rub),
    #[error("The payout {0} does not exist")]
    PayoutNotFound(PayoutId),
    #[error("The transaction (internal id {0}) does not exist")]
    TransactionNotFound(i64),
    #[error("An order is already bound to the transaction for payout {0}")]
    OrderAlreadyBound(PayoutId),
    #[error("The transaction (internal id {0}) is not in a releasable state")]
    NotReleasable(i64),
    #[error(transparent)]
    Database(#[from] SettlementDbError),
    #[error("Trading platform failure: {0}")]
    Platform(#[from] PlatformError),
}
