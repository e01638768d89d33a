//! Runtime wiring for the settlement reconciliation engine.
//!
//! This crate turns the engine library into a running service: it loads the [`config::DaemonConfig`] from the
//! environment, connects the database, wires the push-event hooks and spawns the four sweep workers (order poll,
//! receipt matching, cancellation detection, fund release).
//!
//! The trading-platform HTTP client is an external collaborator. A deployment binary supplies its client (any
//! [`TradingPlatform`] implementation) and feeds platform push traffic through the producers returned by
//! [`start_daemon`]:
//!
//! ```ignore
//! dotenvy::dotenv().ok();
//! env_logger::init();
//! let config = DaemonConfig::from_env_or_default();
//! let daemon = start_daemon(config, my_platform_client).await?;
//! // hand daemon.producers to the websocket adapter, then:
//! daemon.wait().await;
//! ```
pub mod config;
pub mod errors;
pub mod hooks;
pub mod workers;

use log::*;
use settlement_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    SettlementDatabase,
    SqliteDatabase,
    TradingPlatform,
};
use tokio::task::JoinHandle;

use crate::{
    config::DaemonConfig,
    errors::DaemonError,
    hooks::{wire_notification_hooks, wire_push_hooks},
    workers::{start_cancellation_worker, start_order_poll_worker, start_receipt_sweep_worker, start_release_worker},
};

/// A started daemon: the worker handles and the producer ends of the push-event channels.
pub struct RunningDaemon {
    /// Producers for feeding platform push events (order created, chat message) into the engine.
    pub producers: EventProducers,
    workers: Vec<JoinHandle<()>>,
}

impl RunningDaemon {
    /// Blocks until the workers exit, which in practice means forever.
    pub async fn wait(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("🚀️ A worker exited abnormally: {e}");
            }
        }
    }
}

/// Connects the database, wires the event hooks and starts the sweep workers.
pub async fn start_daemon<P>(config: DaemonConfig, platform: P) -> Result<RunningDaemon, DaemonError>
where P: TradingPlatform + 'static {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections).await?;
    info!("🚀️ Connected to {}", config.database_url);
    let accounts = db.fetch_active_accounts().await?;
    if accounts.is_empty() {
        return Err(DaemonError::InitializeError(
            "No active trading accounts are configured. Register at least one account before starting.".into(),
        ));
    }
    let own_sender_ids = accounts.iter().map(|a| a.account_id.clone()).collect::<Vec<_>>();
    info!("🚀️ {} trading account(s) active", accounts.len());

    let mut hooks = EventHooks::default();
    wire_push_hooks(&mut hooks, db.clone(), platform.clone(), own_sender_ids);
    wire_notification_hooks(&mut hooks);
    let handlers = EventHandlers::new(config.event_buffer_size, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let workers = vec![
        start_order_poll_worker(db.clone(), platform.clone(), config.order_poll_interval, config.stale_order_threshold),
        start_receipt_sweep_worker(db.clone(), producers.clone(), config.receipt_sweep_interval),
        start_cancellation_worker(db.clone(), platform.clone(), producers.clone(), config.cancellation_sweep_interval),
        start_release_worker(db, platform, producers.clone(), config.release_sweep_interval, config.release_delay),
    ];
    info!("🚀️ Settlement daemon started with {} workers", workers.len());
    Ok(RunningDaemon { producers, workers })
}
