//! Utilities for setting up test environments: per-test sqlite databases with migrations applied, and an
//! in-memory [`TradingPlatform`](crate::traits::TradingPlatform) with scriptable behaviour.
mod mock_platform;
mod prepare_env;

pub use mock_platform::MockPlatform;
pub use prepare_env::{create_database, prepare_test_env, random_db_path, run_migrations};
