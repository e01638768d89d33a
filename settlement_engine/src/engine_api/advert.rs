use log::*;
use pse_common::Rub;

use crate::{
    db_types::{NewAdvertisement, PaymentMethod, Payout, PayoutId, Transaction},
    helpers::looks_like_phone,
    traits::{AdParams, SettlementDatabase, TradingPlatform},
};

use super::{AccountSelection, CapacityManager, EngineError};

/// Result of an issuance attempt. `Waiting` means every account is saturated; the caller re-invokes on the next
/// scheduling tick and no partial state has been created.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// A transaction already existed for this payout; returned unchanged.
    Existing(Transaction),
    /// Advertisement created on the platform and transaction opened in `Pending`.
    Created(Transaction),
    /// No free advertisement slot. Retry later; this is backpressure, not an error.
    Waiting,
}

/// `AdvertApi` turns an approved payout into exactly one sell advertisement on the trading platform and one
/// internal settlement transaction, no matter how many times it is invoked for the same payout.
pub struct AdvertApi<B, P> {
    db: B,
    platform: P,
    capacity: CapacityManager<B, P>,
}

impl<B, P> AdvertApi<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P, capacity: CapacityManager<B, P>) -> Self {
        Self { db, platform, capacity }
    }

    /// Issues the advertisement backing `payout_id`.
    ///
    /// The ordering of the guards matters: the idempotency check comes first so that re-delivery of an
    /// already-processed payout never re-validates (a wallet blacklisted *after* issuance must not flip the
    /// outcome), and validation precedes the capacity check so invalid payouts never consume a slot.
    pub async fn issue_for_payout(&self, payout_id: &PayoutId) -> Result<IssueOutcome, EngineError> {
        if let Some(tx) = self.db.fetch_transaction_for_payout(payout_id).await? {
            trace!("📢 Payout {payout_id} already has transaction [{}]. Nothing to do.", tx.id);
            return Ok(IssueOutcome::Existing(tx));
        }
        let payout = self
            .db
            .fetch_payout(payout_id)
            .await?
            .ok_or_else(|| EngineError::PayoutNotFound(payout_id.clone()))?;
        if self.db.is_wallet_blacklisted(&payout.wallet).await? {
            warn!("📢 Payout {payout_id} rejected: wallet {} is blacklisted", payout.wallet);
            return Err(EngineError::BlacklistedWallet(payout.wallet));
        }
        if payout.amount <= Rub::from(0) {
            warn!("📢 Payout {payout_id} rejected: non-positive amount {}", payout.amount);
            return Err(EngineError::InvalidAmount(payout.amount));
        }
        let preference = preferred_method(&payout);
        let (account, method) = match self.capacity.select_account(Some(preference)).await? {
            AccountSelection::Selected { account, method } => (account, method),
            AccountSelection::NoCapacity => {
                debug!("📢 No advertisement capacity for payout {payout_id}. Waiting.");
                return Ok(IssueOutcome::Waiting);
            },
        };
        let params = ad_params(&payout, &account.account_id, method);
        let item_id = self.platform.create_advertisement(&params).await?;
        self.capacity.invalidate(&account.account_id).await;
        info!("📢 Advertisement [{item_id}] created on account {} for payout {payout_id}", account.account_id);
        let ad = NewAdvertisement {
            item_id,
            account_id: account.account_id,
            payout_id: payout.payout_id.clone(),
            price: payout.amount,
            quantity: params.quantity,
            payment_method: method,
        };
        let tx = self.db.persist_issued_advertisement(ad).await?;
        Ok(IssueOutcome::Created(tx))
    }

    /// Dashboard override: takes the current advertisement down and posts a fresh one for the same payout.
    ///
    /// Refused while an order is bound (the live trade owns the ad) and on terminal transactions. The old ad is
    /// cancelled on-platform before anything local changes, so a failure leaves the previous state intact.
    pub async fn reissue_advertisement(&self, payout_id: &PayoutId) -> Result<IssueOutcome, EngineError> {
        let tx = self
            .db
            .fetch_transaction_for_payout(payout_id)
            .await?
            .ok_or_else(|| EngineError::PayoutNotFound(payout_id.clone()))?;
        if tx.status.is_terminal() {
            trace!("📢 Reissue for payout {payout_id} ignored: transaction [{}] is terminal", tx.id);
            return Ok(IssueOutcome::Existing(tx));
        }
        if tx.order_id.is_some() {
            return Err(EngineError::OrderAlreadyBound(payout_id.clone()));
        }
        let payout = self
            .db
            .fetch_payout(payout_id)
            .await?
            .ok_or_else(|| EngineError::PayoutNotFound(payout_id.clone()))?;
        self.platform.cancel_advertisement(&tx.item_id).await?;
        self.db.deactivate_advertisement(&tx.item_id).await?;
        if let Some(old) = self.db.fetch_advertisement(&tx.item_id).await? {
            self.capacity.invalidate(&old.account_id).await;
        }
        info!("📢 Old advertisement [{}] for payout {payout_id} cancelled; re-issuing", tx.item_id);
        let preference = preferred_method(&payout);
        let (account, method) = match self.capacity.select_account(Some(preference)).await? {
            AccountSelection::Selected { account, method } => (account, method),
            AccountSelection::NoCapacity => return Ok(IssueOutcome::Waiting),
        };
        let params = ad_params(&payout, &account.account_id, method);
        let item_id = self.platform.create_advertisement(&params).await?;
        self.capacity.invalidate(&account.account_id).await;
        let ad = NewAdvertisement {
            item_id: item_id.clone(),
            account_id: account.account_id,
            payout_id: payout.payout_id.clone(),
            price: payout.amount,
            quantity: params.quantity,
            payment_method: method,
        };
        // The repoint is guarded on order_id IS NULL in the same SQL transaction, so an order that slipped in
        // since the check above refuses the swap rather than losing its advertisement.
        let Some(tx) = self.db.replace_advertisement(ad).await? else {
            warn!("📢 An order was bound to payout {payout_id} mid-reissue. Taking replacement ad [{item_id}] down.");
            self.platform.cancel_advertisement(&item_id).await?;
            return Err(EngineError::OrderAlreadyBound(payout_id.clone()));
        };
        Ok(IssueOutcome::Created(tx))
    }
}

/// SBP for phone wallets, card rail for card wallets. A heuristic, not a guarantee — capacity diversity rules
/// may override it.
fn preferred_method(payout: &Payout) -> PaymentMethod {
    if looks_like_phone(&payout.wallet) {
        PaymentMethod::Sbp
    } else {
        PaymentMethod::Card
    }
}

fn ad_params(payout: &Payout, account_id: &str, method: PaymentMethod) -> AdParams {
    AdParams {
        account_id: account_id.to_string(),
        price: payout.amount,
        // Quantity mirrors the fiat amount; rate computation is a collaborator concern.
        quantity: format!("{}", payout.amount.value() as f64 / 100.0),
        payment_method: method,
        remark: Some(format!("payout {}", payout.payout_id)),
    }
}
