use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::db_types::{
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
};

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("Internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The requested payout {0} does not exist")]
    PayoutNotFound(PayoutId),
    #[error("The requested transaction (internal id {0}) does not exist")]
    TransactionNotFound(i64),
    #[error("The requested advertisement {0} does not exist")]
    AdvertisementNotFound(ItemId),
    #[error("The requested account {0} does not exist")]
    AccountNotFound(String),
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}

/// This trait defines the storage behaviour for backends supporting the settlement engine.
///
/// Three idioms run through every method:
/// * **Keyed upserts** — ingestion endpoints receive at-least-once delivery, so every insert is keyed on an
///   external unique id and re-delivery is a no-op.
/// * **Guarded updates** — status changes and one-shot field assignments (`order_id`, `receipt.payout_id`) are
///   single conditional updates that return `None` when the guard fails, which callers absorb as "someone got
///   there first".
/// * **Sweep queries** — the periodic reconciliation workers select their unit-of-work batches through dedicated
///   queries rather than scanning in application code.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    //----------------------------------------- Payouts -----------------------------------------

    /// Upserts a payout record keyed on its external id. Returns the stored row.
    async fn upsert_payout(&self, payout: NewPayout) -> Result<Payout, SettlementDbError>;

    async fn fetch_payout(&self, payout_id: &PayoutId) -> Result<Option<Payout>, SettlementDbError>;

    /// Payouts in the awaiting-confirmation platform state whose transaction is still matchable, joined with that
    /// transaction. Candidate set for the receipt matcher.
    async fn fetch_matchable_candidates(&self) -> Result<Vec<(Transaction, Payout)>, SettlementDbError>;

    //----------------------------------------- Blacklist ---------------------------------------

    async fn is_wallet_blacklisted(&self, wallet: &str) -> Result<bool, SettlementDbError>;

    async fn add_wallet_to_blacklist(&self, wallet: &str, reason: &str) -> Result<(), SettlementDbError>;

    //----------------------------------------- Advertisements ----------------------------------

    /// In one atomic transaction: upserts the advertisement (keyed on `item_id`) and creates the linked
    /// settlement transaction in `Pending` status if none exists for the payout yet. Returns the transaction.
    ///
    /// This is the write side of the 1:1 payout/transaction invariant: the unique key on `payout_id` makes
    /// re-invocation idempotent without locking.
    async fn persist_issued_advertisement(&self, ad: NewAdvertisement) -> Result<Transaction, SettlementDbError>;

    /// Swaps the advertisement backing a payout for a freshly-created one (manual re-issue): updates the
    /// advertisement row in place and repoints the transaction's `item_id`, atomically. The repoint is guarded
    /// on `order_id IS NULL`; `None` means an order was bound in the meantime and nothing was changed.
    async fn replace_advertisement(&self, ad: NewAdvertisement) -> Result<Option<Transaction>, SettlementDbError>;

    async fn fetch_advertisement(&self, item_id: &ItemId) -> Result<Option<Advertisement>, SettlementDbError>;

    /// Active advertisements for one account, most recent first.
    async fn active_ads_for_account(&self, account_id: &str) -> Result<Vec<Advertisement>, SettlementDbError>;

    /// Marks an advertisement inactive (platform delete confirmed or re-issue in progress).
    async fn deactivate_advertisement(&self, item_id: &ItemId) -> Result<(), SettlementDbError>;

    //----------------------------------------- Transactions ------------------------------------

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, SettlementDbError>;

    async fn fetch_transaction_for_payout(&self, payout_id: &PayoutId)
        -> Result<Option<Transaction>, SettlementDbError>;

    async fn fetch_transaction_for_order(&self, order_id: &OrderId) -> Result<Option<Transaction>, SettlementDbError>;

    /// Sets the order id on a transaction, provided no order id is bound yet. Returns `None` when the guard
    /// fails (already bound).
    async fn bind_order_id(&self, transaction_id: i64, order_id: &OrderId)
        -> Result<Option<Transaction>, SettlementDbError>;

    /// Compare-and-set status update: `from → to` in a single conditional UPDATE. Returns the updated row, or
    /// `None` when the row was not in `from` (stale transition, absorbed by callers as a no-op).
    ///
    /// Timestamps are stamped as a side effect of the target status: `ReceiptReceived` sets
    /// `receipt_received_at`, `PaymentReceived` sets `approved_at`, `Completed` sets `completed_at` and
    /// `Cancelled` sets `cancelled_at`.
    async fn update_status_cas(
        &self,
        transaction_id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Option<Transaction>, SettlementDbError>;

    /// Forces a transaction to a terminal status from any non-terminal one, recording an optional failure
    /// reason. Returns `None` when the transaction was already terminal.
    async fn terminate_transaction(
        &self,
        transaction_id: i64,
        status: TransactionStatus,
        reason: Option<&str>,
    ) -> Result<Option<Transaction>, SettlementDbError>;

    /// Increments the chat progress counter and returns the new value.
    async fn increment_chat_step(&self, transaction_id: i64) -> Result<i64, SettlementDbError>;

    /// Non-terminal transactions with a bound order. Unit of work for the cancellation sweep.
    async fn fetch_bound_active_transactions(&self) -> Result<Vec<Transaction>, SettlementDbError>;

    /// Transactions whose receipt/approval timestamp is older than `delay`, in `ReceiptReceived` or
    /// `PaymentReceived` status. Unit of work for the fund release sweep.
    async fn fetch_release_candidates(&self, delay: Duration) -> Result<Vec<Transaction>, SettlementDbError>;

    /// Transactions created before `cutoff` that still have no bound order. Flagged for operator attention.
    async fn fetch_stale_unbound(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>, SettlementDbError>;

    //----------------------------------------- Chat --------------------------------------------

    /// Inserts a chat message keyed on its external id. The second element is `false` when the message was
    /// already stored (duplicate delivery).
    async fn insert_chat_message(&self, msg: NewChatMessage) -> Result<(ChatMessage, bool), SettlementDbError>;

    async fn fetch_chat_messages(&self, transaction_id: i64) -> Result<Vec<ChatMessage>, SettlementDbError>;

    async fn mark_chat_message_processed(&self, message_id: i64) -> Result<(), SettlementDbError>;

    //----------------------------------------- Receipts ----------------------------------------

    /// Inserts a receipt keyed on its source email id. The second element is `false` when the receipt was
    /// already stored.
    async fn insert_receipt(&self, receipt: NewReceipt) -> Result<(Receipt, bool), SettlementDbError>;

    /// Successfully parsed receipts not yet linked to a payout. Unit of work for the matching sweep.
    async fn fetch_unmatched_receipts(&self) -> Result<Vec<Receipt>, SettlementDbError>;

    /// Links a receipt to a payout, provided the receipt is not linked yet. Returns `None` when the guard fails
    /// (a receipt matches at most one payout, ever).
    async fn link_receipt_to_payout(
        &self,
        receipt_id: i64,
        payout_id: &PayoutId,
    ) -> Result<Option<Receipt>, SettlementDbError>;

    //----------------------------------------- Accounts ----------------------------------------

    async fn fetch_active_accounts(&self) -> Result<Vec<BybitAccount>, SettlementDbError>;

    /// Registers or refreshes a trading account credential set, keyed on the external account id.
    async fn upsert_account(
        &self,
        account_id: &str,
        name: &str,
        api_key: &str,
        api_secret: &str,
    ) -> Result<BybitAccount, SettlementDbError>;

    /// Active-ad count for one account derived from local advertisement rows. Advisory only — the live platform
    /// count wins when they disagree.
    async fn local_active_ad_count(&self, account_id: &str) -> Result<usize, SettlementDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}
