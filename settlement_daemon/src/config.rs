//! Environment-driven daemon configuration. Every knob has a sensible default; malformed values are logged and
//! replaced by the default rather than aborting startup.
use std::{env, time::Duration};

use log::*;
use settlement_engine::engine_api::{DEFAULT_LIVE_COUNT_TTL, DEFAULT_RELEASE_DELAY, DEFAULT_STALE_ORDER_THRESHOLD};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/settlement_store.db";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;
const DEFAULT_ORDER_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RECEIPT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CANCELLATION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_RELEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub database_url: String,
    pub max_db_connections: u32,
    /// How often the order binder polls the platform for orders the push feed missed.
    pub order_poll_interval: Duration,
    pub receipt_sweep_interval: Duration,
    pub cancellation_sweep_interval: Duration,
    pub release_sweep_interval: Duration,
    /// Safety window between payment confirmation and the irreversible funds release.
    pub release_delay: Duration,
    /// Age after which a transaction with no counterparty is flagged for operator attention.
    pub stale_order_threshold: Duration,
    /// Freshness window for cached live ad counts.
    pub live_count_ttl: Duration,
    pub event_buffer_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            order_poll_interval: DEFAULT_ORDER_POLL_INTERVAL,
            receipt_sweep_interval: DEFAULT_RECEIPT_SWEEP_INTERVAL,
            cancellation_sweep_interval: DEFAULT_CANCELLATION_SWEEP_INTERVAL,
            release_sweep_interval: DEFAULT_RELEASE_SWEEP_INTERVAL,
            release_delay: DEFAULT_RELEASE_DELAY,
            stale_order_threshold: DEFAULT_STALE_ORDER_THRESHOLD,
            live_count_ttl: DEFAULT_LIVE_COUNT_TTL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl DaemonConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("PSE_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PSE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_db_connections = env::var("PSE_MAX_DB_CONNECTIONS")
            .map(|s| {
                s.parse::<u32>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for PSE_MAX_DB_CONNECTIONS. {e} Using the default, \
                         {DEFAULT_MAX_DB_CONNECTIONS}, instead."
                    );
                    DEFAULT_MAX_DB_CONNECTIONS
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MAX_DB_CONNECTIONS);
        let event_buffer_size = env::var("PSE_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        Self {
            database_url,
            max_db_connections,
            order_poll_interval: duration_from_env("PSE_ORDER_POLL_INTERVAL_SECS", DEFAULT_ORDER_POLL_INTERVAL),
            receipt_sweep_interval: duration_from_env("PSE_RECEIPT_SWEEP_INTERVAL_SECS", DEFAULT_RECEIPT_SWEEP_INTERVAL),
            cancellation_sweep_interval: duration_from_env(
                "PSE_CANCELLATION_SWEEP_INTERVAL_SECS",
                DEFAULT_CANCELLATION_SWEEP_INTERVAL,
            ),
            release_sweep_interval: duration_from_env("PSE_RELEASE_SWEEP_INTERVAL_SECS", DEFAULT_RELEASE_SWEEP_INTERVAL),
            release_delay: duration_from_env("PSE_RELEASE_DELAY_SECS", DEFAULT_RELEASE_DELAY),
            stale_order_threshold: duration_from_env("PSE_STALE_ORDER_THRESHOLD_SECS", DEFAULT_STALE_ORDER_THRESHOLD),
            live_count_ttl: duration_from_env("PSE_LIVE_COUNT_TTL_SECS", DEFAULT_LIVE_COUNT_TTL),
            event_buffer_size,
        }
    }
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    match env::var(var) {
        Ok(s) => match s.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(e) => {
                error!("🪛️ {s} is not a valid number of seconds for {var}. {e} Using the default, {default:?}.");
                default
            },
        },
        Err(_) => default,
    }
}
