mod support;

use std::time::Duration;

use pse_common::Rub;
use settlement_engine::{
    db_types::{OrderId, Transaction, TransactionStatus, ORDER_STATUS_APPEAL, ORDER_STATUS_CANCELLED},
    events::OrderCreatedEvent,
    test_utils::MockPlatform,
    BindOutcome,
    CancellationApi,
    EngineError,
    OrderBinderApi,
    ReleaseApi,
    SettlementDatabase,
    SqliteDatabase,
};
use support::*;

/// An issued transaction with a live order bound to it. Returns the transaction in `ChatStarted`.
async fn bound_transaction(db: &SqliteDatabase, platform: &MockPlatform, payout_id: &str, order: &str) -> Transaction {
    let tx = issued_transaction(db, platform, payout_id, "+79991234567", 5000, "Сбербанк").await;
    platform.add_order(ACCOUNT, &OrderId(order.into()), Some(tx.item_id.clone()), Rub::from_rubles(5000));
    let binder = OrderBinderApi::new(db.clone(), platform.clone());
    let event = OrderCreatedEvent {
        item_id: tx.item_id.clone(),
        order_id: OrderId(order.into()),
        price: Rub::from_rubles(5000),
    };
    match binder.handle_order_created(&event).await.expect("Error binding order") {
        BindOutcome::Bound(tx) => tx,
        other => panic!("expected a bind, got {other:?}"),
    }
}

#[tokio::test]
async fn platform_cancellation_closes_the_transaction() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    platform.set_order_status(&OrderId("order-1".into()), ORDER_STATUS_CANCELLED);

    let api = CancellationApi::new(db.clone(), platform.clone());
    let closed = api.sweep().await.unwrap();
    assert_eq!(closed.len(), 1);
    let cancelled = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    // Re-sweeping finds nothing: terminal transactions leave the unit of work.
    assert!(api.sweep().await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_phrases_alone_never_cancel() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    platform.add_chat_message(&OrderId("order-1".into()), "m-1", "buyer-77", "отмена, передумал");

    let api = CancellationApi::new(db.clone(), platform.clone());
    // The order is still live on the platform, so the phrase is logged and ignored.
    assert!(api.sweep().await.unwrap().is_empty());
    let unchanged = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TransactionStatus::ChatStarted);

    // Once the platform confirms, the cancellation goes through.
    platform.set_order_status(&OrderId("order-1".into()), ORDER_STATUS_CANCELLED);
    let closed = api.sweep().await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].transaction.status, TransactionStatus::Cancelled);
}

#[tokio::test]
async fn our_own_chat_messages_are_not_a_cancellation_tip_off() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    // The only cancellation talk on the live transcript is our own templated warning.
    platform.add_chat_message(
        &OrderId("order-1".into()),
        "m-1",
        ACCOUNT,
        "we will cancel the order if payment does not arrive",
    );

    let api = CancellationApi::new(db.clone(), platform.clone());
    assert!(api.sweep().await.unwrap().is_empty());
    let unchanged = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TransactionStatus::ChatStarted);
    // No tip-off, so the sweep checked the order status exactly once.
    assert_eq!(platform.order_detail_calls(&OrderId("order-1".into())), 1);
}

#[tokio::test]
async fn appeals_freeze_payment_stage_transactions() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    db.update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::WaitingPayment).await.unwrap();
    db.update_status_cas(tx.id, TransactionStatus::WaitingPayment, TransactionStatus::PaymentReceived).await.unwrap();
    platform.set_order_status(&OrderId("order-1".into()), ORDER_STATUS_APPEAL);

    let api = CancellationApi::new(db.clone(), platform.clone());
    assert!(api.sweep().await.unwrap().is_empty(), "an appeal is not a close");
    let frozen = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(frozen.status, TransactionStatus::Appeal);
}

#[tokio::test]
async fn funds_release_waits_out_the_safety_delay() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    db.update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::ReceiptReceived).await.unwrap();

    let api = ReleaseApi::new(db.clone(), platform.clone());
    // Inside the safety window: nothing is released.
    assert!(api.sweep(Duration::from_secs(60)).await.unwrap().is_empty());
    assert!(platform.released_orders().is_empty());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let closed = api.sweep(Duration::ZERO).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].transaction.status, TransactionStatus::Completed);
    assert!(closed[0].transaction.completed_at.is_some());
    assert_eq!(platform.released_orders(), vec![OrderId("order-1".into())]);

    // A second sweep cannot release the same funds twice.
    assert!(api.sweep(Duration::ZERO).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_release_parks_the_transaction_for_the_operator() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    db.update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::ReceiptReceived).await.unwrap();
    platform.fail_release_for(&OrderId("order-1".into()));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let api = ReleaseApi::new(db.clone(), platform.clone());
    let closed = api.sweep(Duration::ZERO).await.unwrap();
    assert_eq!(closed.len(), 1);
    let failed = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert!(failed.failure_reason.as_deref().unwrap_or_default().contains("release failed"));

    // Failed transactions are not retried automatically.
    assert!(api.sweep(Duration::ZERO).await.unwrap().is_empty());
    assert!(platform.released_orders().is_empty());
}

#[tokio::test]
async fn receipts_without_an_order_defer_release() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    db.update_status_cas(tx.id, TransactionStatus::Pending, TransactionStatus::ReceiptReceived).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let api = ReleaseApi::new(db.clone(), platform.clone());
    assert!(api.sweep(Duration::ZERO).await.unwrap().is_empty());
    let waiting = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(waiting.status, TransactionStatus::ReceiptReceived, "stays queued until the binder catches up");
}

#[tokio::test]
async fn force_release_skips_the_delay_but_not_the_guards() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;
    let api = ReleaseApi::new(db.clone(), platform.clone());

    // Not in a releasable stage yet.
    let result = api.force_release(tx.id).await;
    assert!(matches!(result, Err(EngineError::NotReleasable(_))));

    db.update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::WaitingPayment).await.unwrap();
    db.update_status_cas(tx.id, TransactionStatus::WaitingPayment, TransactionStatus::PaymentReceived).await.unwrap();
    let completed = api.force_release(tx.id).await.unwrap();
    assert_eq!(completed.status, TransactionStatus::Completed);
    assert_eq!(platform.released_orders(), vec![OrderId("order-1".into())]);
}

#[tokio::test]
async fn status_updates_are_compare_and_set() {
    let (db, platform) = new_test_env().await;
    let tx = bound_transaction(&db, &platform, "p-1", "order-1").await;

    // A stale worker still believing the transaction is Pending loses silently.
    let stale =
        db.update_status_cas(tx.id, TransactionStatus::Pending, TransactionStatus::ChatStarted).await.unwrap();
    assert!(stale.is_none());

    // Backward transitions are rejected outright.
    let backward =
        db.update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::Pending).await.unwrap();
    assert!(backward.is_none());

    // Terminal states absorb everything that comes after.
    db.terminate_transaction(tx.id, TransactionStatus::Cancelled, Some("counterparty vanished")).await.unwrap();
    let after =
        db.update_status_cas(tx.id, TransactionStatus::Cancelled, TransactionStatus::ChatStarted).await.unwrap();
    assert!(after.is_none());
    let again = db.terminate_transaction(tx.id, TransactionStatus::Failed, None).await.unwrap();
    assert!(again.is_none(), "a terminal transaction cannot be re-terminated");
    let final_state = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(final_state.status, TransactionStatus::Cancelled);
}
