use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::*;
use tokio::sync::Mutex;

use crate::{
    db_types::{BybitAccount, PaymentMethod},
    traits::{SettlementDatabase, TradingPlatform},
};

use super::EngineError;

/// Hard platform limit on simultaneously-active advertisements per account.
pub const MAX_ACTIVE_ADS_PER_ACCOUNT: usize = 2;

/// How long a live ad-count fetched from the platform stays fresh. Short on purpose: the local count can drift
/// when a platform-side delete is missed, and the live count is the correction path.
pub const DEFAULT_LIVE_COUNT_TTL: Duration = Duration::from_secs(30);

/// Result of an account selection. `NoCapacity` is backpressure, not an error: callers re-invoke on the next
/// scheduling tick.
#[derive(Debug, Clone)]
pub enum AccountSelection {
    Selected { account: BybitAccount, method: PaymentMethod },
    NoCapacity,
}

/// Tracks advertisement slots across trading accounts and hands out the best free one.
///
/// The active-ad count per account is `max(local, live)`: the live platform count is authoritative when the two
/// disagree, protecting against missed-delete drift. Live counts are cached per account with a fixed TTL.
pub struct CapacityManager<B, P> {
    db: B,
    platform: P,
    ttl: Duration,
    live_counts: Arc<Mutex<HashMap<String, (usize, Instant)>>>,
}

impl<B: Clone, P: Clone> Clone for CapacityManager<B, P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            platform: self.platform.clone(),
            ttl: self.ttl,
            live_counts: Arc::clone(&self.live_counts),
        }
    }
}

impl<B, P> CapacityManager<B, P>
where
    B: SettlementDatabase,
    P: TradingPlatform,
{
    pub fn new(db: B, platform: P) -> Self {
        Self::with_ttl(db, platform, DEFAULT_LIVE_COUNT_TTL)
    }

    pub fn with_ttl(db: B, platform: P, ttl: Duration) -> Self {
        Self { db, platform, ttl, live_counts: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Picks an account with a free advertisement slot, alternating payment method against the account's
    /// existing ad to maximise SBP/card diversity.
    ///
    /// Two passes over the active accounts: first the accounts where posting with the preferred method keeps
    /// the two ads on different rails, then any account with a free slot. Accounts whose live count cannot be
    /// fetched are skipped this round rather than trusted blindly.
    pub async fn select_account(
        &self,
        preference: Option<PaymentMethod>,
    ) -> Result<AccountSelection, EngineError> {
        let accounts = self.db.fetch_active_accounts().await?;
        let mut open_slots: Vec<(BybitAccount, PaymentMethod)> = Vec::new();
        for account in accounts {
            let local = self.db.local_active_ad_count(&account.account_id).await?;
            let live = match self.live_count(&account.account_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("📊 Could not verify live ad count for account {}: {e}. Skipping it this round.",
                        account.account_id);
                    continue;
                },
            };
            let count = local.max(live);
            if count >= MAX_ACTIVE_ADS_PER_ACCOUNT {
                trace!("📊 Account {} is saturated ({count} active ads)", account.account_id);
                continue;
            }
            let method = self.method_for(&account, preference).await?;
            open_slots.push((account, method));
        }
        if open_slots.is_empty() {
            debug!("📊 All accounts are saturated. Reporting no capacity.");
            return Ok(AccountSelection::NoCapacity);
        }
        // Prefer a slot where we can honour the requested method.
        let preferred = preference.and_then(|want| {
            open_slots.iter().position(|(_, method)| *method == want)
        });
        let (account, method) = match preferred {
            Some(idx) => open_slots.swap_remove(idx),
            None => open_slots.swap_remove(0),
        };
        debug!("📊 Selected account {} with method {method}", account.account_id);
        Ok(AccountSelection::Selected { account, method })
    }

    /// The method a new ad on this account must use: the opposite of the existing single ad's method, or the
    /// caller's preference when the account is empty.
    async fn method_for(
        &self,
        account: &BybitAccount,
        preference: Option<PaymentMethod>,
    ) -> Result<PaymentMethod, EngineError> {
        let ads = self.db.active_ads_for_account(&account.account_id).await?;
        let method = match ads.first() {
            Some(ad) => ad.payment_method.opposite(),
            None => preference.unwrap_or(PaymentMethod::Sbp),
        };
        Ok(method)
    }

    async fn live_count(&self, account_id: &str) -> Result<usize, EngineError> {
        let mut cache = self.live_counts.lock().await;
        if let Some((count, at)) = cache.get(account_id) {
            if at.elapsed() < self.ttl {
                return Ok(*count);
            }
        }
        let count = self.platform.count_active_ads(account_id).await?;
        cache.insert(account_id.to_string(), (count, Instant::now()));
        Ok(count)
    }

    /// Drops the cached live count for one account, forcing a re-fetch on next use. Called after we create or
    /// cancel an ad ourselves, since we just changed the quantity being cached.
    pub async fn invalidate(&self, account_id: &str) {
        self.live_counts.lock().await.remove(account_id);
    }
}
