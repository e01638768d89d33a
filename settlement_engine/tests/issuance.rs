mod support;

use pse_common::Rub;
use settlement_engine::{
    db_types::{ItemId, NewAdvertisement, OrderId, PaymentMethod, PayoutId},
    EngineError,
    IssueOutcome,
    SettlementDatabase,
};
use support::*;

#[tokio::test]
async fn issuing_the_same_payout_twice_creates_one_ad_and_one_transaction() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    let api = advert_api(&db, &platform);

    let first = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    let IssueOutcome::Created(tx) = first else { panic!("first issuance must create") };
    let second = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    let IssueOutcome::Existing(same) = second else { panic!("second issuance must be a no-op") };

    assert_eq!(tx.id, same.id);
    assert_eq!(platform.created_ad_count(), 1);
}

#[tokio::test]
async fn redelivered_payout_feed_is_a_noop_update() {
    let (db, _) = new_test_env().await;
    let first = db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    let second = db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбер")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.amount, Rub::from_rubles(5000));
}

#[tokio::test]
async fn blacklisted_wallet_is_rejected_without_side_effects() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    db.add_wallet_to_blacklist("+79991234567", "chargeback history").await.unwrap();
    let api = advert_api(&db, &platform);

    let result = api.issue_for_payout(&PayoutId("p-1".into())).await;
    assert!(matches!(result, Err(EngineError::BlacklistedWallet(_))));
    assert!(db.fetch_transaction_for_payout(&PayoutId("p-1".into())).await.unwrap().is_none());
    assert_eq!(platform.created_ad_count(), 0);
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 0, "Сбербанк")).await.unwrap();
    let api = advert_api(&db, &platform);
    let result = api.issue_for_payout(&PayoutId("p-1".into())).await;
    assert!(matches!(result, Err(EngineError::InvalidAmount(_))));
    assert_eq!(platform.created_ad_count(), 0);
}

#[tokio::test]
async fn saturated_accounts_produce_backpressure_not_errors() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    platform.set_live_ad_count(ACCOUNT, 2);
    let api = advert_api(&db, &platform);

    let outcome = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Waiting));
    // No partial state: the payout can be re-issued cleanly once a slot frees up.
    assert!(db.fetch_transaction_for_payout(&PayoutId("p-1".into())).await.unwrap().is_none());

    platform.set_live_ad_count(ACCOUNT, 0);
    let outcome = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Created(_)));
}

#[tokio::test]
async fn live_platform_count_overrides_a_lower_local_count() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    // Locally we know of no ads, but the platform says the account is full (drift from a missed delete).
    platform.set_live_ad_count(ACCOUNT, 2);
    let api = advert_api(&db, &platform);
    let outcome = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Waiting));
}

#[tokio::test]
async fn unverifiable_accounts_are_skipped_for_the_round() {
    let (db, platform) = new_test_env().await;
    db.upsert_payout(payout("p-1", "+79991234567", 5000, "Сбербанк")).await.unwrap();
    platform.fail_count_for(ACCOUNT);
    let api = advert_api(&db, &platform);
    // The only account cannot be verified, so the round reports no capacity rather than guessing.
    let outcome = api.issue_for_payout(&PayoutId("p-1".into())).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Waiting));
}

#[tokio::test]
async fn two_ads_on_one_account_use_different_payment_methods() {
    let (db, platform) = new_test_env().await;
    issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    issued_transaction(&db, &platform, "p-2", "+79991234568", 6000, "Сбербанк").await;

    let ads = db.active_ads_for_account(ACCOUNT).await.unwrap();
    assert_eq!(ads.len(), 2);
    assert_ne!(ads[0].payment_method, ads[1].payment_method);
    // Both payouts carry phone wallets, so the first ad honoured the SBP preference.
    assert!(ads.iter().any(|ad| ad.payment_method == PaymentMethod::Sbp));
}

#[tokio::test]
async fn reissue_swaps_the_advertisement_but_keeps_the_transaction() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    let old_item = tx.item_id.clone();
    let api = advert_api(&db, &platform);

    let outcome = api.reissue_advertisement(&PayoutId("p-1".into())).await.unwrap();
    let IssueOutcome::Created(renewed) = outcome else { panic!("reissue must create a new ad") };

    assert_eq!(renewed.id, tx.id, "still the same transaction row");
    assert_ne!(renewed.item_id, old_item);
    assert!(!platform.is_ad_active(&old_item));
    assert!(db.fetch_advertisement(&old_item).await.unwrap().is_none(), "old ad row was repointed, not duplicated");
    assert!(db.fetch_advertisement(&renewed.item_id).await.unwrap().is_some());
}

#[tokio::test]
async fn reissue_is_refused_once_an_order_is_bound() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    db.bind_order_id(tx.id, &OrderId("order-1".into())).await.unwrap().expect("bind must succeed");

    let api = advert_api(&db, &platform);
    let result = api.reissue_advertisement(&PayoutId("p-1".into())).await;
    assert!(matches!(result, Err(EngineError::OrderAlreadyBound(_))));
    // The live trade keeps its advertisement.
    assert!(platform.is_ad_active(&tx.item_id));
    assert!(db.fetch_advertisement(&tx.item_id).await.unwrap().is_some());
}

#[tokio::test]
async fn a_bound_order_keeps_its_advertisement_even_against_a_stale_reissue() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    db.bind_order_id(tx.id, &OrderId("order-1".into())).await.unwrap().expect("bind must succeed");

    // A swap attempted after the bind (a racing reissue that read the pre-bind row) must be refused by the
    // guard inside the swap itself, not only by the caller's earlier check.
    let replacement = NewAdvertisement {
        item_id: ItemId("stale-item".into()),
        account_id: ACCOUNT.to_string(),
        payout_id: PayoutId("p-1".into()),
        price: Rub::from_rubles(5000),
        quantity: "5000".into(),
        payment_method: PaymentMethod::Sbp,
    };
    assert!(db.replace_advertisement(replacement).await.unwrap().is_none());

    let unchanged = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(unchanged.item_id, tx.item_id);
    assert!(db.fetch_advertisement(&tx.item_id).await.unwrap().is_some());
}
