use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Advertisement, ItemId, NewAdvertisement},
    traits::SettlementDbError,
};

/// Upserts an advertisement keyed on its external `item_id`. At-least-once delivery of the platform's creation
/// confirmation makes re-insertion routine; the conflict clause refreshes the mutable fields only.
pub async fn upsert_advertisement(
    ad: NewAdvertisement,
    conn: &mut SqliteConnection,
) -> Result<Advertisement, SettlementDbError> {
    let row: Advertisement = sqlx::query_as(
        r#"
            INSERT INTO advertisements (item_id, account_id, payout_id, price, quantity, payment_method)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (item_id) DO UPDATE SET
                price = excluded.price,
                quantity = excluded.quantity,
                active = 1,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(ad.item_id)
    .bind(ad.account_id)
    .bind(ad.payout_id)
    .bind(ad.price)
    .bind(ad.quantity)
    .bind(ad.payment_method.to_string())
    .fetch_one(conn)
    .await?;
    debug!("📢 Advertisement [{}] stored with id {} for payout {}", row.item_id, row.id, row.payout_id);
    Ok(row)
}

/// Swaps the advertisement row for a payout to point at a freshly-created platform ad. Used by manual re-issue;
/// the 1:1 payout/advertisement invariant means this is an update, never a second insert.
pub async fn replace_advertisement(
    ad: NewAdvertisement,
    conn: &mut SqliteConnection,
) -> Result<Advertisement, SettlementDbError> {
    let row: Advertisement = sqlx::query_as(
        r#"
            UPDATE advertisements SET
                item_id = $1,
                account_id = $2,
                price = $3,
                quantity = $4,
                payment_method = $5,
                active = 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE payout_id = $6
            RETURNING *;
        "#,
    )
    .bind(ad.item_id)
    .bind(ad.account_id)
    .bind(ad.price)
    .bind(ad.quantity)
    .bind(ad.payment_method.to_string())
    .bind(ad.payout_id)
    .fetch_one(conn)
    .await?;
    debug!("📢 Advertisement for payout {} replaced with [{}]", row.payout_id, row.item_id);
    Ok(row)
}

pub async fn fetch_advertisement(
    item_id: &ItemId,
    conn: &mut SqliteConnection,
) -> Result<Option<Advertisement>, SettlementDbError> {
    let ad = sqlx::query_as("SELECT * FROM advertisements WHERE item_id = $1")
        .bind(item_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(ad)
}

pub async fn active_ads_for_account(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Advertisement>, SettlementDbError> {
    let ads = sqlx::query_as(
        "SELECT * FROM advertisements WHERE account_id = $1 AND active = 1 ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(conn)
    .await?;
    Ok(ads)
}

pub async fn count_active_ads(account_id: &str, conn: &mut SqliteConnection) -> Result<usize, SettlementDbError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM advertisements WHERE account_id = $1 AND active = 1")
            .bind(account_id)
            .fetch_one(conn)
            .await?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as usize)
}

pub async fn deactivate_advertisement(item_id: &ItemId, conn: &mut SqliteConnection) -> Result<(), SettlementDbError> {
    sqlx::query("UPDATE advertisements SET active = 0, updated_at = CURRENT_TIMESTAMP WHERE item_id = $1")
        .bind(item_id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}
