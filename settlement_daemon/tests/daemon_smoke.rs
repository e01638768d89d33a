use std::time::Duration;

use pse_common::Rub;
use settlement_daemon::{config::DaemonConfig, errors::DaemonError, start_daemon};
use settlement_engine::{
    db_types::{NewPayout, OrderId, PayoutId, TransactionStatus},
    events::OrderCreatedEvent,
    test_utils::{prepare_test_env, random_db_path, MockPlatform},
    AdvertApi,
    CapacityManager,
    IssueOutcome,
    SettlementDatabase,
    SqliteDatabase,
};

async fn prepared_db() -> (String, SqliteDatabase) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    // A single pooled connection keeps the test's reads strictly ordered after its writes.
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error connecting to test database");
    (url, db)
}

fn test_config(url: &str) -> DaemonConfig {
    DaemonConfig {
        database_url: url.to_string(),
        // Tight loops so the smoke test observes sweep activity quickly.
        order_poll_interval: Duration::from_millis(100),
        receipt_sweep_interval: Duration::from_millis(100),
        cancellation_sweep_interval: Duration::from_millis(100),
        release_sweep_interval: Duration::from_millis(100),
        release_delay: Duration::ZERO,
        ..DaemonConfig::default()
    }
}

#[tokio::test]
async fn daemon_refuses_to_start_without_accounts() {
    let (url, _db) = prepared_db().await;
    let result = start_daemon(test_config(&url), MockPlatform::new()).await;
    assert!(matches!(result, Err(DaemonError::InitializeError(_))));
}

#[tokio::test]
async fn push_events_flow_through_the_daemon_into_the_engine() {
    let (url, db) = prepared_db().await;
    db.upsert_account("acc-1", "Primary", "key", "secret").await.unwrap();
    db.upsert_payout(NewPayout::new(
        PayoutId("p-1".into()),
        "+79991234567".into(),
        Rub::from_rubles(5000),
        "Сбербанк".into(),
    ))
    .await
    .unwrap();

    let platform = MockPlatform::new();
    let advert =
        AdvertApi::new(db.clone(), platform.clone(), CapacityManager::new(db.clone(), platform.clone()));
    let IssueOutcome::Created(tx) = advert.issue_for_payout(&PayoutId("p-1".into())).await.unwrap() else {
        panic!("issuance must create a transaction");
    };

    let daemon = start_daemon(test_config(&url), platform.clone()).await.expect("daemon must start");
    let producer = daemon.producers.order_created_producer.first().expect("order hook must be wired");
    producer
        .publish_event(OrderCreatedEvent {
            item_id: tx.item_id.clone(),
            order_id: OrderId("order-1".into()),
            price: Rub::from_rubles(5000),
        })
        .await;

    // Give the handler task a moment to drain the channel.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let bound = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(bound.order_id, Some(OrderId("order-1".into())));
    assert_eq!(bound.status, TransactionStatus::ChatStarted);
}
