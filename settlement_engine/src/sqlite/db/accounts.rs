use sqlx::SqliteConnection;

use crate::{db_types::BybitAccount, traits::SettlementDbError};

pub async fn fetch_active(conn: &mut SqliteConnection) -> Result<Vec<BybitAccount>, SettlementDbError> {
    let accounts = sqlx::query_as("SELECT * FROM bybit_accounts WHERE active = 1 ORDER BY id ASC")
        .fetch_all(conn)
        .await?;
    Ok(accounts)
}

pub async fn upsert_account(
    account_id: &str,
    name: &str,
    api_key: &str,
    api_secret: &str,
    conn: &mut SqliteConnection,
) -> Result<BybitAccount, SettlementDbError> {
    let account = sqlx::query_as(
        r#"
            INSERT INTO bybit_accounts (account_id, name, api_key, api_secret)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (account_id) DO UPDATE SET
                name = excluded.name,
                api_key = excluded.api_key,
                api_secret = excluded.api_secret,
                active = 1,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(account_id)
    .bind(name)
    .bind(api_key)
    .bind(api_secret)
    .fetch_one(conn)
    .await?;
    Ok(account)
}
