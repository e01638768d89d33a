//! `SqliteDatabase` is a concrete implementation of a settlement engine storage backend.
//!
//! Unsurprisingly, it uses SQLite and implements [`SettlementDatabase`] by delegating to the per-table
//! functions in the [`db`](super::db) module, wrapping multi-step writes in a single SQL transaction.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use super::db::{accounts, advertisements, chat, new_pool, payouts, receipts, transactions};
use crate::{
    db_types::{
        Advertisement,
        BybitAccount,
        ChatMessage,
        ItemId,
        NewAdvertisement,
        NewChatMessage,
        NewPayout,
        NewReceipt,
        OrderId,
        Payout,
        PayoutId,
        Receipt,
        Transaction,
        TransactionStatus,
    },
    traits::{SettlementDatabase, SettlementDbError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool with the given maximum number of connections and connects to the database.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDbError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn upsert_payout(&self, payout: NewPayout) -> Result<Payout, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payouts::upsert_payout(payout, &mut conn).await
    }

    async fn fetch_payout(&self, payout_id: &PayoutId) -> Result<Option<Payout>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_payout(payout_id, &mut conn).await
    }

    async fn fetch_matchable_candidates(&self) -> Result<Vec<(Transaction, Payout)>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payouts::fetch_matchable_candidates(&mut conn).await
    }

    async fn is_wallet_blacklisted(&self, wallet: &str) -> Result<bool, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payouts::is_wallet_blacklisted(wallet, &mut conn).await
    }

    async fn add_wallet_to_blacklist(&self, wallet: &str, reason: &str) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        payouts::add_wallet_to_blacklist(wallet, reason, &mut conn).await
    }

    /// The advertisement upsert and the transaction insert commit or roll back together, so a crash between the
    /// two can never leave an advertisement without its transaction.
    async fn persist_issued_advertisement(&self, ad: NewAdvertisement) -> Result<Transaction, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let payout_id = ad.payout_id.clone();
        let stored = advertisements::upsert_advertisement(ad, &mut tx).await?;
        let (settlement_tx, _created) = transactions::idempotent_insert(&payout_id, &stored.item_id, &mut tx).await?;
        tx.commit().await?;
        Ok(settlement_tx)
    }

    /// The `order_id IS NULL` guard and the repoint are one conditional UPDATE inside the transaction, so a
    /// concurrently-bound order can never have its advertisement swapped out from under it.
    async fn replace_advertisement(&self, ad: NewAdvertisement) -> Result<Option<Transaction>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let settlement_tx: Option<Transaction> = sqlx::query_as(
            "UPDATE transactions SET item_id = $1, updated_at = CURRENT_TIMESTAMP \
             WHERE payout_id = $2 AND order_id IS NULL RETURNING *",
        )
        .bind(ad.item_id.as_str())
        .bind(ad.payout_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(settlement_tx) = settlement_tx else {
            tx.rollback().await?;
            return Ok(None);
        };
        advertisements::replace_advertisement(ad, &mut tx).await?;
        tx.commit().await?;
        Ok(Some(settlement_tx))
    }

    async fn fetch_advertisement(&self, item_id: &ItemId) -> Result<Option<Advertisement>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        advertisements::fetch_advertisement(item_id, &mut conn).await
    }

    async fn active_ads_for_account(&self, account_id: &str) -> Result<Vec<Advertisement>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        advertisements::active_ads_for_account(account_id, &mut conn).await
    }

    async fn deactivate_advertisement(&self, item_id: &ItemId) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        advertisements::deactivate_advertisement(item_id, &mut conn).await
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction(id, &mut conn).await
    }

    async fn fetch_transaction_for_payout(
        &self,
        payout_id: &PayoutId,
    ) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction_for_payout(payout_id, &mut conn).await
    }

    async fn fetch_transaction_for_order(&self, order_id: &OrderId) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_transaction_for_order(order_id, &mut conn).await
    }

    async fn bind_order_id(
        &self,
        transaction_id: i64,
        order_id: &OrderId,
    ) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::bind_order_id(transaction_id, order_id, &mut conn).await
    }

    async fn update_status_cas(
        &self,
        transaction_id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::update_status_cas(transaction_id, from, to, &mut conn).await
    }

    async fn terminate_transaction(
        &self,
        transaction_id: i64,
        status: TransactionStatus,
        reason: Option<&str>,
    ) -> Result<Option<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::terminate(transaction_id, status, reason, &mut conn).await
    }

    async fn increment_chat_step(&self, transaction_id: i64) -> Result<i64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::increment_chat_step(transaction_id, &mut conn).await
    }

    async fn fetch_bound_active_transactions(&self) -> Result<Vec<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_bound_active(&mut conn).await
    }

    async fn fetch_release_candidates(&self, delay: Duration) -> Result<Vec<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_release_candidates(delay, &mut conn).await
    }

    async fn fetch_stale_unbound(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        transactions::fetch_stale_unbound(cutoff, &mut conn).await
    }

    async fn insert_chat_message(&self, msg: NewChatMessage) -> Result<(ChatMessage, bool), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        chat::idempotent_insert(msg, &mut conn).await
    }

    async fn fetch_chat_messages(&self, transaction_id: i64) -> Result<Vec<ChatMessage>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        chat::fetch_for_transaction(transaction_id, &mut conn).await
    }

    async fn mark_chat_message_processed(&self, message_id: i64) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        chat::mark_processed(message_id, &mut conn).await
    }

    async fn insert_receipt(&self, receipt: NewReceipt) -> Result<(Receipt, bool), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        receipts::idempotent_insert(receipt, &mut conn).await
    }

    async fn fetch_unmatched_receipts(&self) -> Result<Vec<Receipt>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        receipts::fetch_unmatched(&mut conn).await
    }

    async fn link_receipt_to_payout(
        &self,
        receipt_id: i64,
        payout_id: &PayoutId,
    ) -> Result<Option<Receipt>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        receipts::link_to_payout(receipt_id, payout_id, &mut conn).await
    }

    async fn fetch_active_accounts(&self) -> Result<Vec<BybitAccount>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_active(&mut conn).await
    }

    async fn upsert_account(
        &self,
        account_id: &str,
        name: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<BybitAccount, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        accounts::upsert_account(account_id, name, api_key, api_secret, &mut conn).await
    }

    async fn local_active_ad_count(&self, account_id: &str) -> Result<usize, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        advertisements::count_active_ads(account_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}
