use settlement_engine::SettlementDbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Could not initialise the daemon. {0}")]
    InitializeError(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] SettlementDbError),
}
