//! Wires the engine's event hooks: platform push events are routed into the order binder and chat APIs, and
//! engine outcomes are surfaced as log notifications.
use log::*;
use settlement_engine::{events::EventHooks, ChatApi, OrderBinderApi, SqliteDatabase, TradingPlatform};

/// Routes platform push events into the engine. The hook closures construct their API per event from cheap
/// clones; both entry points are idempotent, so replayed or duplicated push traffic is harmless.
pub fn wire_push_hooks<P>(hooks: &mut EventHooks, db: SqliteDatabase, platform: P, own_sender_ids: Vec<String>)
where P: TradingPlatform + 'static {
    let binder_db = db.clone();
    let binder_platform = platform.clone();
    hooks.on_order_created(move |event| {
        let db = binder_db.clone();
        let platform = binder_platform.clone();
        Box::pin(async move {
            let binder = OrderBinderApi::new(db, platform);
            if let Err(e) = binder.handle_order_created(&event).await {
                error!("🔗 Order-created event for {} failed: {e}", event.order_id);
            }
        })
    });
    hooks.on_chat_message(move |event| {
        let db = db.clone();
        let platform = platform.clone();
        let own = own_sender_ids.clone();
        Box::pin(async move {
            let chat = ChatApi::new(db, platform, own);
            if let Err(e) = chat.handle_chat_message(&event).await {
                error!("💬 Chat event on order {} failed: {e}", event.order_id);
            }
        })
    });
}

/// Surfaces engine outcomes in the log. Deployments that want dashboards or alerting subscribe their own hooks
/// instead of (or next to) these.
pub fn wire_notification_hooks(hooks: &mut EventHooks) {
    hooks.on_receipt_matched(|event| {
        Box::pin(async move {
            info!(
                "🧾 Receipt [{}] for {} settled payout {} (transaction [{}])",
                event.receipt.email_id,
                event.receipt.amount,
                event.payout_id,
                event.transaction.id
            );
        })
    });
    hooks.on_transaction_closed(|event| {
        Box::pin(async move {
            let tx = &event.transaction;
            match &tx.failure_reason {
                Some(reason) => {
                    warn!("📕 Transaction [{}] for payout {} closed as {}: {reason}", tx.id, tx.payout_id, tx.status)
                },
                None => info!("📕 Transaction [{}] for payout {} closed as {}", tx.id, tx.payout_id, tx.status),
            }
        })
    });
}
