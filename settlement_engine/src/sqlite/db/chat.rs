use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ChatMessage, NewChatMessage},
    traits::SettlementDbError,
};

/// Inserts a chat message, returning `false` in the second element when the external id was already stored.
/// Chat automation consumes each message exactly once, so duplicate push/poll delivery must collapse here.
pub async fn idempotent_insert(
    msg: NewChatMessage,
    conn: &mut SqliteConnection,
) -> Result<(ChatMessage, bool), SettlementDbError> {
    let existing: Option<ChatMessage> = sqlx::query_as("SELECT * FROM chat_messages WHERE external_id = $1")
        .bind(&msg.external_id)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(m) = existing {
        trace!("💬 Chat message [{}] already stored; duplicate delivery ignored", m.external_id);
        return Ok((m, false));
    }
    let row: ChatMessage = sqlx::query_as(
        r#"
            INSERT INTO chat_messages (transaction_id, external_id, sender, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(msg.transaction_id)
    .bind(msg.external_id)
    .bind(msg.sender.to_string())
    .bind(msg.body)
    .fetch_one(conn)
    .await?;
    Ok((row, true))
}

pub async fn fetch_for_transaction(
    transaction_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ChatMessage>, SettlementDbError> {
    let messages =
        sqlx::query_as("SELECT * FROM chat_messages WHERE transaction_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(transaction_id)
            .fetch_all(conn)
            .await?;
    Ok(messages)
}

pub async fn mark_processed(message_id: i64, conn: &mut SqliteConnection) -> Result<(), SettlementDbError> {
    sqlx::query("UPDATE chat_messages SET processed = 1 WHERE id = $1").bind(message_id).execute(conn).await?;
    Ok(())
}
