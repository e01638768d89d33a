use log::*;
use pse_common::Rub;

use crate::{
    db_types::{Payout, Receipt, ReceiptStatus, Transaction, TransactionStatus, TransferType},
    events::ReceiptMatchedEvent,
    helpers::{bank_alias_match, card_suffix_match, is_tbank_brand, phone_suffix_match, platform_date},
    traits::SettlementDatabase,
};

use super::EngineError;

/// Maximum amount discrepancy tolerated by the fuzzy discovery pass. The exact matcher tolerates nothing.
pub const AMOUNT_TOLERANCE: Rub = Rub::from_rubles(100);

/// Whether `receipt` is plausible evidence of the transfer `payout` asked for, amount aside.
///
/// All rules must hold:
/// * the bank confirmed the transfer (`Success`, no parse error);
/// * the transfer date, in the platform's timezone, is not before the payout's;
/// * the bank rule for the transfer type holds (`ToTbank` → the payout bank is the T-Bank brand; `ByPhone` → the
///   receipt and payout banks alias-match; `ToCard` → banks are not compared);
/// * the wallet rule holds (`ByPhone` → last 10 phone digits equal; `ToCard` → last 4 card digits equal;
///   `ToTbank` → whichever evidence the receipt carries: phone digits when a phone is present, card digits
///   otherwise).
pub fn receipt_matches_payout(receipt: &Receipt, payout: &Payout) -> bool {
    if receipt.status != ReceiptStatus::Success || receipt.parse_error.is_some() {
        return false;
    }
    if platform_date(receipt.transfer_date) < platform_date(payout.created_at) {
        return false;
    }
    let bank_ok = match receipt.transfer_type {
        TransferType::ToTbank => is_tbank_brand(&payout.bank),
        TransferType::ToCard => true,
        TransferType::ByPhone => {
            receipt.bank.as_deref().map(|bank| bank_alias_match(bank, &payout.bank)).unwrap_or(false)
        },
    };
    if !bank_ok {
        return false;
    }
    match receipt.transfer_type {
        TransferType::ByPhone => {
            receipt.phone.as_deref().map(|phone| phone_suffix_match(&payout.wallet, phone)).unwrap_or(false)
        },
        TransferType::ToCard => {
            receipt.card.as_deref().map(|card| card_suffix_match(&payout.wallet, card)).unwrap_or(false)
        },
        // T-Bank receipts identify the recipient by phone or by card depending on how the sender addressed the
        // transfer. Match on whichever the receipt carries.
        TransferType::ToTbank => match (receipt.phone.as_deref(), receipt.card.as_deref()) {
            (Some(phone), _) => phone_suffix_match(&payout.wallet, phone),
            (None, Some(card)) => card_suffix_match(&payout.wallet, card),
            (None, None) => false,
        },
    }
}

/// `ReceiptMatcherApi` links inbound bank receipts to the payouts they settle and advances the matched
/// transactions to `ReceiptReceived`.
///
/// The exact matcher requires amount equality and is the only path that mutates state. The fuzzy pass is a
/// read-only discovery aid for orphaned receipts.
pub struct ReceiptMatcherApi<B> {
    db: B,
}

impl<B> ReceiptMatcherApi<B>
where B: SettlementDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Tries to match one receipt against the current candidate set. Returns the match event when a link was
    /// made, `None` otherwise (the receipt stays queued for the next sweep).
    ///
    /// With several candidates passing every rule, the oldest payout wins. The link is a guarded one-shot
    /// assignment, so a racing matcher silently loses.
    pub async fn match_receipt(&self, receipt: &Receipt) -> Result<Option<ReceiptMatchedEvent>, EngineError> {
        if receipt.payout_id.is_some() {
            trace!("🧾 Receipt [{}] is already matched. Nothing to do.", receipt.email_id);
            return Ok(None);
        }
        if receipt.status != ReceiptStatus::Success || receipt.parse_error.is_some() {
            trace!("🧾 Receipt [{}] is not matchable (status {}, parse error: {:?})",
                receipt.email_id, receipt.status, receipt.parse_error);
            return Ok(None);
        }
        let mut candidates = self
            .db
            .fetch_matchable_candidates()
            .await?
            .into_iter()
            .filter(|(_, payout)| payout.amount == receipt.amount && receipt_matches_payout(receipt, payout))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            trace!("🧾 No candidate payout for receipt [{}] ({}). Re-queued.", receipt.email_id, receipt.amount);
            return Ok(None);
        }
        if candidates.len() > 1 {
            debug!(
                "🧾 {} payouts pass every rule for receipt [{}]. Taking the oldest.",
                candidates.len(),
                receipt.email_id
            );
            candidates.sort_by_key(|(_, payout)| payout.created_at);
        }
        let (tx, payout) = candidates.swap_remove(0);
        let Some(linked) = self.db.link_receipt_to_payout(receipt.id, &payout.payout_id).await? else {
            trace!("🧾 Receipt [{}] was linked by someone else in the meantime.", receipt.email_id);
            return Ok(None);
        };
        info!(
            "🧾 Receipt [{}] for {} matched to payout {} (transaction [{}])",
            linked.email_id, linked.amount, payout.payout_id, tx.id
        );
        let tx = self.advance_to_receipt_received(tx).await?;
        Ok(Some(ReceiptMatchedEvent { receipt: linked, payout_id: payout.payout_id, transaction: tx }))
    }

    /// Read-only discovery pass for receipts no exact rule set claims: same rules, but the amount may differ by
    /// up to [`AMOUNT_TOLERANCE`]. The single closest candidate wins; a tie is treated as no match, since
    /// guessing between two payouts moves real money to the wrong person.
    pub async fn find_payout_fuzzy(&self, receipt: &Receipt) -> Result<Option<Payout>, EngineError> {
        if receipt.payout_id.is_some() {
            return Ok(None);
        }
        let mut near = self
            .db
            .fetch_matchable_candidates()
            .await?
            .into_iter()
            .map(|(_, payout)| payout)
            .filter(|payout| {
                payout.amount.abs_diff(receipt.amount) <= AMOUNT_TOLERANCE && receipt_matches_payout(receipt, payout)
            })
            .collect::<Vec<_>>();
        near.sort_by_key(|payout| payout.amount.abs_diff(receipt.amount));
        if near.is_empty() {
            return Ok(None);
        }
        if near.len() > 1 && near[0].amount.abs_diff(receipt.amount) == near[1].amount.abs_diff(receipt.amount) {
            debug!("🧾 Fuzzy match for receipt [{}] is ambiguous. Declining to guess.", receipt.email_id);
            return Ok(None);
        }
        Ok(Some(near.swap_remove(0)))
    }

    /// One matching pass over every queued receipt. Returns the events for all new matches.
    pub async fn sweep(&self) -> Result<Vec<ReceiptMatchedEvent>, EngineError> {
        let receipts = self.db.fetch_unmatched_receipts().await?;
        let mut events = Vec::new();
        for receipt in receipts {
            match self.match_receipt(&receipt).await {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {},
                Err(e) => warn!("🧾 Matching receipt [{}] failed: {e}. Continuing the sweep.", receipt.email_id),
            }
        }
        if !events.is_empty() {
            info!("🧾 Receipt sweep matched {} receipt(s)", events.len());
        }
        Ok(events)
    }

    /// CAS the transaction into `ReceiptReceived`, retrying once on a stale read. A transaction that moved past
    /// the receivable stages in the meantime is left where it is.
    async fn advance_to_receipt_received(&self, tx: Transaction) -> Result<Transaction, EngineError> {
        let mut current = tx;
        for _ in 0..2 {
            match self
                .db
                .update_status_cas(current.id, current.status, TransactionStatus::ReceiptReceived)
                .await?
            {
                Some(updated) => return Ok(updated),
                None => match self.db.fetch_transaction(current.id).await? {
                    Some(fresh) if fresh.status.can_transition_to(TransactionStatus::ReceiptReceived) => {
                        current = fresh;
                    },
                    Some(fresh) => {
                        debug!("🧾 Transaction [{}] is already {}. Leaving it be.", fresh.id, fresh.status);
                        return Ok(fresh);
                    },
                    None => return Err(EngineError::TransactionNotFound(current.id)),
                },
            }
        }
        Ok(current)
    }
}
