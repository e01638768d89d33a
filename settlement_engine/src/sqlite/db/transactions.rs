use chrono::{DateTime, Duration, Utc};
use log::{debug, trace, warn};
use sqlx::SqliteConnection;

use crate::{
    db_types::{ItemId, OrderId, PayoutId, Transaction, TransactionStatus},
    traits::SettlementDbError,
};

/// Inserts the settlement transaction for a payout in `Pending` status, returning the existing row unchanged if
/// one already exists. The unique key on `payout_id` is the 1:1 invariant.
pub async fn idempotent_insert(
    payout_id: &PayoutId,
    item_id: &ItemId,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, bool), SettlementDbError> {
    if let Some(existing) = fetch_transaction_for_payout(payout_id, &mut *conn).await? {
        trace!("🗃️ Transaction for payout {payout_id} already exists with id {}", existing.id);
        return Ok((existing, false));
    }
    let tx: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (payout_id, item_id)
            VALUES ($1, $2)
            ON CONFLICT (payout_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(payout_id.as_str())
    .bind(item_id.as_str())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Transaction [{}] created for payout {payout_id} / advertisement {item_id}", tx.id);
    Ok((tx, true))
}

pub async fn fetch_transaction(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transaction>, SettlementDbError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_transaction_for_payout(
    payout_id: &PayoutId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SettlementDbError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE payout_id = $1")
        .bind(payout_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

pub async fn fetch_transaction_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SettlementDbError> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// One-shot order binding: sets `order_id` only while it is still NULL. A `None` result means another delivery
/// path got there first.
pub async fn bind_order_id(
    transaction_id: i64,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SettlementDbError> {
    let tx = sqlx::query_as(
        "UPDATE transactions SET order_id = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 AND order_id IS NULL RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(transaction_id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

/// Compare-and-set status update. The WHERE clause on the current status is the whole concurrency story: a stale
/// sweep loses the race and gets `None` back, which callers treat as a no-op.
pub async fn update_status_cas(
    transaction_id: i64,
    from: TransactionStatus,
    to: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SettlementDbError> {
    if !from.can_transition_to(to) {
        warn!("🗃️ Rejected illegal transition {from} -> {to} for transaction [{transaction_id}]");
        return Ok(None);
    }
    let stamp = timestamp_clause(to);
    let sql = format!(
        "UPDATE transactions SET status = $1, updated_at = CURRENT_TIMESTAMP{stamp} \
         WHERE id = $2 AND status = $3 RETURNING *"
    );
    let tx: Option<Transaction> = sqlx::query_as(&sql)
        .bind(to.to_string())
        .bind(transaction_id)
        .bind(from.to_string())
        .fetch_optional(conn)
        .await?;
    match &tx {
        Some(t) => debug!("🗃️ Transaction [{}] moved {from} -> {to}", t.id),
        None => trace!("🗃️ Stale transition {from} -> {to} for transaction [{transaction_id}] ignored"),
    }
    Ok(tx)
}

/// Short-circuits a transaction to a terminal status from any non-terminal one.
pub async fn terminate(
    transaction_id: i64,
    status: TransactionStatus,
    reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, SettlementDbError> {
    if !status.is_terminal() {
        warn!("🗃️ terminate called with non-terminal status {status} for transaction [{transaction_id}]");
        return Ok(None);
    }
    let stamp = timestamp_clause(status);
    let sql = format!(
        "UPDATE transactions SET status = $1, failure_reason = $2, updated_at = CURRENT_TIMESTAMP{stamp} \
         WHERE id = $3 AND status NOT IN ('Completed', 'Cancelled', 'Failed', 'Blacklisted') RETURNING *"
    );
    let tx: Option<Transaction> =
        sqlx::query_as(&sql).bind(status.to_string()).bind(reason).bind(transaction_id).fetch_optional(conn).await?;
    match &tx {
        Some(t) => debug!("🗃️ Transaction [{}] terminated as {status}", t.id),
        None => trace!("🗃️ Transaction [{transaction_id}] already terminal; {status} ignored"),
    }
    Ok(tx)
}

fn timestamp_clause(to: TransactionStatus) -> &'static str {
    match to {
        TransactionStatus::ReceiptReceived => ", receipt_received_at = CURRENT_TIMESTAMP",
        TransactionStatus::PaymentReceived => ", approved_at = CURRENT_TIMESTAMP",
        TransactionStatus::Completed => ", completed_at = CURRENT_TIMESTAMP",
        TransactionStatus::Cancelled => ", cancelled_at = CURRENT_TIMESTAMP",
        _ => "",
    }
}

pub async fn increment_chat_step(transaction_id: i64, conn: &mut SqliteConnection) -> Result<i64, SettlementDbError> {
    let (step,): (i64,) = sqlx::query_as(
        "UPDATE transactions SET chat_step = chat_step + 1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 RETURNING chat_step",
    )
    .bind(transaction_id)
    .fetch_one(conn)
    .await?;
    Ok(step)
}

/// Unit of work for the cancellation sweep: every live transaction that has a counterparty on the hook.
pub async fn fetch_bound_active(conn: &mut SqliteConnection) -> Result<Vec<Transaction>, SettlementDbError> {
    let txs = sqlx::query_as(
        "SELECT * FROM transactions \
         WHERE order_id IS NOT NULL AND status NOT IN ('Completed', 'Cancelled', 'Failed', 'Blacklisted') \
         ORDER BY created_at ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(txs)
}

/// Unit of work for the fund release sweep: receipt-confirmed transactions whose safety delay has elapsed.
pub async fn fetch_release_candidates(
    delay: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SettlementDbError> {
    let secs = delay.num_seconds();
    let sql = format!(
        "SELECT * FROM transactions WHERE \
           (status = 'ReceiptReceived' AND receipt_received_at IS NOT NULL \
              AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(receipt_received_at)) > {secs}) \
        OR (status = 'PaymentReceived' AND approved_at IS NOT NULL \
              AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(approved_at)) > {secs}) \
        ORDER BY created_at ASC"
    );
    let txs = sqlx::query_as(sql.as_str()).fetch_all(conn).await?;
    Ok(txs)
}

/// Transactions created before `cutoff` with no bound order. Flagged for operator attention, never auto-cancelled.
pub async fn fetch_stale_unbound(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, SettlementDbError> {
    let txs = sqlx::query_as(
        "SELECT * FROM transactions \
         WHERE order_id IS NULL AND status = 'Pending' AND created_at < $1 ORDER BY created_at ASC",
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}
