//! Shared scaffolding for the integration tests: a fresh migrated database per test, a scriptable mock trading
//! platform, and builders for the common fixtures.
#![allow(dead_code)]

use pse_common::Rub;
use settlement_engine::{
    db_types::{NewPayout, NewReceipt, PayoutId, ReceiptStatus, Transaction, TransferType},
    test_utils::{prepare_test_env, random_db_path, MockPlatform},
    AdvertApi,
    CapacityManager,
    IssueOutcome,
    SettlementDatabase,
    SqliteDatabase,
};

pub const ACCOUNT: &str = "acc-1";

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    // A single pooled connection keeps each test's reads strictly ordered after its writes.
    SqliteDatabase::new_with_url(&url, 1).await.expect("Error connecting to test database")
}

/// A database with one active trading account, plus an empty mock platform.
pub async fn new_test_env() -> (SqliteDatabase, MockPlatform) {
    let db = new_test_db().await;
    db.upsert_account(ACCOUNT, "Primary", "key-1", "secret-1").await.expect("Error seeding account");
    (db, MockPlatform::new())
}

/// A capacity manager with live-count caching disabled, so scripted platform counts take effect immediately.
pub fn capacity(db: &SqliteDatabase, platform: &MockPlatform) -> CapacityManager<SqliteDatabase, MockPlatform> {
    CapacityManager::with_ttl(db.clone(), platform.clone(), std::time::Duration::ZERO)
}

pub fn advert_api(db: &SqliteDatabase, platform: &MockPlatform) -> AdvertApi<SqliteDatabase, MockPlatform> {
    AdvertApi::new(db.clone(), platform.clone(), capacity(db, platform))
}

pub fn payout(id: &str, wallet: &str, rub: i64, bank: &str) -> NewPayout {
    NewPayout::new(PayoutId(id.to_string()), wallet.to_string(), Rub::from_rubles(rub), bank.to_string())
}

pub fn phone_receipt(email_id: &str, rub: i64, phone: &str, bank: &str) -> NewReceipt {
    NewReceipt {
        email_id: email_id.to_string(),
        amount: Rub::from_rubles(rub),
        transfer_date: chrono::Utc::now(),
        bank: Some(bank.to_string()),
        phone: Some(phone.to_string()),
        card: None,
        transfer_type: TransferType::ByPhone,
        status: ReceiptStatus::Success,
        parse_error: None,
    }
}

pub fn card_receipt(email_id: &str, rub: i64, card: &str, transfer_type: TransferType) -> NewReceipt {
    NewReceipt {
        email_id: email_id.to_string(),
        amount: Rub::from_rubles(rub),
        transfer_date: chrono::Utc::now(),
        bank: None,
        phone: None,
        card: Some(card.to_string()),
        transfer_type,
        status: ReceiptStatus::Success,
        parse_error: None,
    }
}

/// Ingests a payout and issues its advertisement, returning the freshly created transaction.
pub async fn issued_transaction(
    db: &SqliteDatabase,
    platform: &MockPlatform,
    payout_id: &str,
    wallet: &str,
    rub: i64,
    bank: &str,
) -> Transaction {
    db.upsert_payout(payout(payout_id, wallet, rub, bank)).await.expect("Error storing payout");
    let api = advert_api(db, platform);
    match api.issue_for_payout(&PayoutId(payout_id.to_string())).await.expect("Error issuing advertisement") {
        IssueOutcome::Created(tx) => tx,
        other => panic!("Expected a fresh transaction for payout {payout_id}, got {other:?}"),
    }
}
