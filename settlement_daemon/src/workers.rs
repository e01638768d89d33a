//! The periodic sweep workers. Each worker owns its engine API instance and loops on a fixed interval; failures
//! are logged and the next tick retries, so a flaky platform never kills a worker.
use std::time::Duration;

use log::*;
use settlement_engine::{
    events::EventProducers,
    CancellationApi,
    OrderBinderApi,
    ReceiptMatcherApi,
    ReleaseApi,
    SqliteDatabase,
    TradingPlatform,
};
use tokio::task::JoinHandle;

/// Starts the order poll worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each tick binds orders the push feed missed and flags transactions that have waited too long for a
/// counterparty.
pub fn start_order_poll_worker<P>(
    db: SqliteDatabase,
    platform: P,
    period: Duration,
    stale_threshold: Duration,
) -> JoinHandle<()>
where
    P: TradingPlatform + 'static,
{
    tokio::spawn(async move {
        let api = OrderBinderApi::new(db, platform);
        let mut timer = tokio::time::interval(period);
        info!("🔗 Order poll worker started (every {period:?})");
        loop {
            timer.tick().await;
            match api.poll_sweep().await {
                Ok(0) => trace!("🔗 Order poll found nothing new"),
                Ok(n) => info!("🔗 Order poll bound {n} order(s)"),
                Err(e) => error!("🔗 Order poll failed: {e}"),
            }
            if let Err(e) = api.flag_stale_unbound(stale_threshold).await {
                error!("🔗 Stale-order check failed: {e}");
            }
        }
    })
}

/// Starts the receipt matching worker. Matched receipts are published on the receipt-matched hook.
pub fn start_receipt_sweep_worker(db: SqliteDatabase, producers: EventProducers, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let api = ReceiptMatcherApi::new(db);
        let mut timer = tokio::time::interval(period);
        info!("🧾 Receipt sweep worker started (every {period:?})");
        loop {
            timer.tick().await;
            match api.sweep().await {
                Ok(events) => {
                    for event in events {
                        for producer in &producers.receipt_matched_producer {
                            producer.publish_event(event.clone()).await;
                        }
                    }
                },
                Err(e) => error!("🧾 Receipt sweep failed: {e}"),
            }
        }
    })
}

/// Starts the cancellation detection worker. Closed transactions are published on the transaction-closed hook.
pub fn start_cancellation_worker<P>(
    db: SqliteDatabase,
    platform: P,
    producers: EventProducers,
    period: Duration,
) -> JoinHandle<()>
where
    P: TradingPlatform + 'static,
{
    tokio::spawn(async move {
        let api = CancellationApi::new(db, platform);
        let mut timer = tokio::time::interval(period);
        info!("🚫 Cancellation worker started (every {period:?})");
        loop {
            timer.tick().await;
            match api.sweep().await {
                Ok(closed) => {
                    for event in closed {
                        for producer in &producers.transaction_closed_producer {
                            producer.publish_event(event.clone()).await;
                        }
                    }
                },
                Err(e) => error!("🚫 Cancellation sweep failed: {e}"),
            }
        }
    })
}

/// Starts the fund release worker. Both completions and failed releases are published on the transaction-closed
/// hook, since either way the transaction has reached its terminal state.
pub fn start_release_worker<P>(
    db: SqliteDatabase,
    platform: P,
    producers: EventProducers,
    period: Duration,
    release_delay: Duration,
) -> JoinHandle<()>
where
    P: TradingPlatform + 'static,
{
    tokio::spawn(async move {
        let api = ReleaseApi::new(db, platform);
        let mut timer = tokio::time::interval(period);
        info!("💰 Release worker started (every {period:?}, delay {release_delay:?})");
        loop {
            timer.tick().await;
            match api.sweep(release_delay).await {
                Ok(closed) => {
                    for event in closed {
                        for producer in &producers.transaction_closed_producer {
                            producer.publish_event(event.clone()).await;
                        }
                    }
                },
                Err(e) => error!("💰 Release sweep failed: {e}"),
            }
        }
    })
}
