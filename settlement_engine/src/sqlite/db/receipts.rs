use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewReceipt, PayoutId, Receipt},
    traits::SettlementDbError,
};

/// Inserts a receipt keyed on its source email id, returning `false` in the second element when it was already
/// stored. The mail provider re-delivers, so this is the de-duplication point for the whole receipt pipeline.
pub async fn idempotent_insert(
    receipt: NewReceipt,
    conn: &mut SqliteConnection,
) -> Result<(Receipt, bool), SettlementDbError> {
    let existing: Option<Receipt> = sqlx::query_as("SELECT * FROM receipts WHERE email_id = $1")
        .bind(&receipt.email_id)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(r) = existing {
        trace!("🧾 Receipt from email [{}] already stored; duplicate delivery ignored", r.email_id);
        return Ok((r, false));
    }
    let row: Receipt = sqlx::query_as(
        r#"
            INSERT INTO receipts (email_id, amount, transfer_date, bank, phone, card, transfer_type, status,
                                  parse_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(receipt.email_id)
    .bind(receipt.amount)
    .bind(receipt.transfer_date)
    .bind(receipt.bank)
    .bind(receipt.phone)
    .bind(receipt.card)
    .bind(receipt.transfer_type.to_string())
    .bind(receipt.status.to_string())
    .bind(receipt.parse_error)
    .fetch_one(conn)
    .await?;
    debug!("🧾 Receipt [{}] stored with id {}", row.email_id, row.id);
    Ok((row, true))
}

/// Successfully parsed receipts that have not been linked to a payout yet. Receipts are never discarded; this is
/// the matching sweep's retry queue.
pub async fn fetch_unmatched(conn: &mut SqliteConnection) -> Result<Vec<Receipt>, SettlementDbError> {
    let receipts = sqlx::query_as(
        "SELECT * FROM receipts WHERE payout_id IS NULL AND parse_error IS NULL ORDER BY created_at ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(receipts)
}

/// One-shot receipt/payout link: only succeeds while the receipt is still unlinked. A receipt matches at most
/// one payout, ever.
pub async fn link_to_payout(
    receipt_id: i64,
    payout_id: &PayoutId,
    conn: &mut SqliteConnection,
) -> Result<Option<Receipt>, SettlementDbError> {
    let receipt: Option<Receipt> = sqlx::query_as(
        "UPDATE receipts SET payout_id = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $2 AND payout_id IS NULL RETURNING *",
    )
    .bind(payout_id.as_str())
    .bind(receipt_id)
    .fetch_optional(conn)
    .await?;
    match &receipt {
        Some(r) => debug!("🧾 Receipt [{}] linked to payout {payout_id}", r.id),
        None => trace!("🧾 Receipt [{receipt_id}] was already linked; duplicate match ignored"),
    }
    Ok(receipt)
}
