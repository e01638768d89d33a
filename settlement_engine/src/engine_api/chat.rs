use log::*;

use crate::{
    db_types::{ChatMessage, ChatSender, NewChatMessage, Transaction, TransactionStatus},
    events::ChatMessageEvent,
    traits::{SettlementDatabase, TradingPlatform},
};

use super::EngineError;

/// `ChatApi` records trade-chat traffic and advances the chat stage of the transaction lifecycle.
///
/// Messages are de-duplicated by the platform's external message id, so replaying a push feed or re-syncing a
/// transcript never double-advances anything. The first counterparty reply moves the transaction `ChatStarted →
/// WaitingPayment`.
pub struct ChatApi<B, P> {
    db: B,
    platform: P,
    /// Sender ids belonging to our own trading accounts. Everything else is the counterparty.
    own_sender_ids: Vec<String>,
}

impl<B, P> ChatApi<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P, own_sender_ids: Vec<String>) -> Self {
        Self { db, platform, own_sender_ids }
    }

    /// Push-path entry point: stores the message and advances the chat stage. Returns the stored message, or
    /// `None` for duplicates and messages on orders we do not know.
    pub async fn handle_chat_message(&self, event: &ChatMessageEvent) -> Result<Option<ChatMessage>, EngineError> {
        let Some(tx) = self.db.fetch_transaction_for_order(&event.order_id).await? else {
            // Push can outrun the order binder. The message is not lost: the transcript sync picks it up once
            // the order is bound.
            warn!("💬 Chat message on unknown order {}. Deferring to the transcript sync.", event.order_id);
            return Ok(None);
        };
        let sender = self.classify(&event.sender_id);
        self.ingest(&tx, &event.external_id, sender, &event.content).await
    }

    /// Poll-path fallback: pulls the full live transcript for a transaction's order and runs every message
    /// through the same idempotent ingestion as the push path. Returns the number of newly stored messages.
    pub async fn sync_transcript(&self, tx: &Transaction) -> Result<usize, EngineError> {
        let Some(order_id) = &tx.order_id else {
            return Ok(0);
        };
        let transcript = self.platform.get_chat_messages(order_id).await?;
        let mut stored = 0usize;
        for msg in transcript {
            let sender = self.classify(&msg.sender_id);
            if self.ingest(tx, &msg.external_id, sender, &msg.content).await?.is_some() {
                stored += 1;
            }
        }
        if stored > 0 {
            debug!("💬 Transcript sync stored {stored} new message(s) for order {order_id}");
        }
        Ok(stored)
    }

    fn classify(&self, sender_id: &str) -> ChatSender {
        if self.own_sender_ids.iter().any(|id| id == sender_id) {
            ChatSender::Us
        } else {
            ChatSender::Counterparty
        }
    }

    /// Stores one message and, for new counterparty messages, bumps `chat_step` and fires the `ChatStarted →
    /// WaitingPayment` transition. The CAS guard makes the transition a one-time event no matter how many
    /// counterparty messages follow.
    async fn ingest(
        &self,
        tx: &Transaction,
        external_id: &str,
        sender: ChatSender,
        body: &str,
    ) -> Result<Option<ChatMessage>, EngineError> {
        let msg = NewChatMessage {
            transaction_id: tx.id,
            external_id: external_id.to_string(),
            sender,
            body: body.to_string(),
        };
        let (stored, created) = self.db.insert_chat_message(msg).await?;
        if !created {
            trace!("💬 Chat message [{}] already stored. Nothing to do.", external_id);
            return Ok(None);
        }
        if sender == ChatSender::Counterparty {
            let step = self.db.increment_chat_step(tx.id).await?;
            trace!("💬 Transaction [{}] chat advanced to step {step}", tx.id);
            if let Some(updated) = self
                .db
                .update_status_cas(tx.id, TransactionStatus::ChatStarted, TransactionStatus::WaitingPayment)
                .await?
            {
                info!("💬 Counterparty replied on order; transaction [{}] is now {}", updated.id, updated.status);
            }
        }
        self.db.mark_chat_message_processed(stored.id).await?;
        Ok(Some(stored))
    }
}
