use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayout, Payout, PayoutId, Transaction, GATE_STATUS_AWAITING_CONFIRMATION},
    traits::SettlementDbError,
};

/// Upserts a payout keyed on its external id. Re-delivery of the same payout refreshes the mutable fields and is
/// otherwise a no-op.
pub async fn upsert_payout(payout: NewPayout, conn: &mut SqliteConnection) -> Result<Payout, SettlementDbError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO payouts (payout_id, wallet, amount, bank, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payout_id) DO UPDATE SET
                status = excluded.status,
                bank = excluded.bank,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(payout.payout_id)
    .bind(payout.wallet)
    .bind(payout.amount)
    .bind(payout.bank)
    .bind(payout.status)
    .bind(payout.created_at)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_payout(
    payout_id: &PayoutId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, SettlementDbError> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE payout_id = $1")
        .bind(payout_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payout)
}

/// The receipt matcher's candidate set: transactions in a matchable status joined with payouts in the
/// awaiting-confirmation platform state.
pub async fn fetch_matchable_candidates(
    conn: &mut SqliteConnection,
) -> Result<Vec<(Transaction, Payout)>, SettlementDbError> {
    let txs: Vec<Transaction> = sqlx::query_as(
        r#"
        SELECT transactions.* FROM transactions
        JOIN payouts ON payouts.payout_id = transactions.payout_id
        WHERE transactions.status IN ('Pending', 'ChatStarted', 'WaitingPayment', 'PaymentReceived')
          AND payouts.status = $1
        ORDER BY transactions.created_at ASC
        "#,
    )
    .bind(GATE_STATUS_AWAITING_CONFIRMATION)
    .fetch_all(&mut *conn)
    .await?;
    let mut result = Vec::with_capacity(txs.len());
    for tx in txs {
        if let Some(payout) = fetch_payout(&tx.payout_id, &mut *conn).await? {
            result.push((tx, payout));
        }
    }
    trace!("💸 {} matchable payout candidates fetched", result.len());
    Ok(result)
}

pub async fn is_wallet_blacklisted(wallet: &str, conn: &mut SqliteConnection) -> Result<bool, SettlementDbError> {
    let hit: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM wallet_blacklist WHERE wallet = $1").bind(wallet).fetch_optional(conn).await?;
    Ok(hit.is_some())
}

pub async fn add_wallet_to_blacklist(
    wallet: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), SettlementDbError> {
    sqlx::query("INSERT INTO wallet_blacklist (wallet, reason) VALUES ($1, $2) ON CONFLICT (wallet) DO NOTHING")
        .bind(wallet)
        .bind(reason)
        .execute(conn)
        .await?;
    Ok(())
}
