mod support;

use chrono::{Duration, Utc};
use pse_common::Rub;
use settlement_engine::{
    db_types::{Payout, PayoutId, Receipt, ReceiptStatus, TransactionStatus, TransferType},
    engine_api::{receipt_matches_payout, AMOUNT_TOLERANCE},
    ReceiptMatcherApi,
    SettlementDatabase,
};
use support::*;

fn bare_payout(wallet: &str, rub: i64, bank: &str) -> Payout {
    Payout {
        id: 1,
        payout_id: PayoutId("p-1".into()),
        wallet: wallet.to_string(),
        amount: Rub::from_rubles(rub),
        bank: bank.to_string(),
        status: 5,
        created_at: Utc::now(),
        approved_at: None,
        updated_at: Utc::now(),
    }
}

fn bare_receipt(rub: i64, transfer_type: TransferType) -> Receipt {
    Receipt {
        id: 1,
        email_id: "e-1".into(),
        amount: Rub::from_rubles(rub),
        transfer_date: Utc::now(),
        bank: None,
        phone: None,
        card: None,
        transfer_type,
        status: ReceiptStatus::Success,
        parse_error: None,
        payout_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn phone_transfers_need_matching_bank_and_phone_suffix() {
    let payout = bare_payout("+79991234567", 5000, "СБЕРБАНК");
    let mut receipt = bare_receipt(5000, TransferType::ByPhone);
    receipt.bank = Some("Sber".into());
    receipt.phone = Some("8 999 123-45-67".into());
    assert!(receipt_matches_payout(&receipt, &payout));

    receipt.phone = Some("89991234568".into());
    assert!(!receipt_matches_payout(&receipt, &payout), "wrong phone suffix");
    receipt.phone = Some("89991234567".into());
    receipt.bank = Some("ВТБ".into());
    assert!(!receipt_matches_payout(&receipt, &payout), "wrong bank");
    receipt.bank = None;
    assert!(!receipt_matches_payout(&receipt, &payout), "phone transfers always disclose the bank");
}

#[test]
fn tbank_transfers_require_the_tbank_brand_on_the_payout() {
    let mut receipt = bare_receipt(5000, TransferType::ToTbank);
    receipt.card = Some("*6789".into());
    let tbank = bare_payout("2200 7001 2345 6789", 5000, "Тинькофф");
    assert!(receipt_matches_payout(&receipt, &tbank));
    let sber = bare_payout("2200 7001 2345 6789", 5000, "Сбербанк");
    assert!(!receipt_matches_payout(&receipt, &sber));
}

#[test]
fn tbank_transfers_match_on_phone_when_the_receipt_carries_no_card() {
    let payout = bare_payout("+79991234567", 5000, "tbank");
    let mut receipt = bare_receipt(5000, TransferType::ToTbank);
    receipt.phone = Some("9991234567".into());
    assert!(receipt_matches_payout(&receipt, &payout));

    receipt.phone = Some("9991234568".into());
    assert!(!receipt_matches_payout(&receipt, &payout), "wrong phone suffix");
    receipt.phone = None;
    assert!(!receipt_matches_payout(&receipt, &payout), "no recipient evidence at all");
}

#[test]
fn card_transfers_skip_the_bank_check_but_compare_last_four() {
    let payout = bare_payout("2200 7001 2345 6789", 5000, "Some Obscure Bank");
    let mut receipt = bare_receipt(5000, TransferType::ToCard);
    receipt.card = Some("*6789".into());
    assert!(receipt_matches_payout(&receipt, &payout));
    receipt.card = Some("*6780".into());
    assert!(!receipt_matches_payout(&receipt, &payout));
}

#[test]
fn receipts_dated_before_the_payout_never_match() {
    let payout = bare_payout("+79991234567", 5000, "СБЕРБАНК");
    let mut receipt = bare_receipt(5000, TransferType::ByPhone);
    receipt.bank = Some("Сбер".into());
    receipt.phone = Some("+79991234567".into());
    receipt.transfer_date = Utc::now() - Duration::days(2);
    assert!(!receipt_matches_payout(&receipt, &payout));
}

#[test]
fn unconfirmed_and_unparsed_receipts_never_match() {
    let payout = bare_payout("+79991234567", 5000, "СБЕРБАНК");
    let mut receipt = bare_receipt(5000, TransferType::ByPhone);
    receipt.bank = Some("Сбер".into());
    receipt.phone = Some("+79991234567".into());
    receipt.status = ReceiptStatus::InProgress;
    assert!(!receipt_matches_payout(&receipt, &payout));
    receipt.status = ReceiptStatus::Success;
    receipt.parse_error = Some("no text layer in PDF".into());
    assert!(!receipt_matches_payout(&receipt, &payout));
}

#[tokio::test]
async fn exact_amount_match_links_the_receipt_and_advances_the_transaction() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    let matcher = ReceiptMatcherApi::new(db.clone());

    // Off by one rouble: stays queued.
    let (near_miss, _) = db.insert_receipt(phone_receipt("e-1", 5001, "89991234567", "Sber")).await.unwrap();
    assert!(matcher.match_receipt(&near_miss).await.unwrap().is_none());

    let (receipt, _) = db.insert_receipt(phone_receipt("e-2", 5000, "89991234567", "Sber")).await.unwrap();
    let event = matcher.match_receipt(&receipt).await.unwrap().expect("exact receipt must match");
    assert_eq!(event.payout_id, PayoutId("p-1".into()));
    assert_eq!(event.transaction.id, tx.id);
    assert_eq!(event.transaction.status, TransactionStatus::ReceiptReceived);
    assert!(event.transaction.receipt_received_at.is_some());
    assert_eq!(event.receipt.payout_id, Some(PayoutId("p-1".into())));

    // The near miss is still queued for the next sweep; the matched one is gone.
    let queued = db.fetch_unmatched_receipts().await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].email_id, "e-1");
}

#[tokio::test]
async fn tbank_phone_receipt_settles_a_phone_wallet_payout() {
    let (db, platform) = new_test_env().await;
    let tx = issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "tbank").await;
    let matcher = ReceiptMatcherApi::new(db.clone());

    // One rouble off: zero tolerance against a known payout.
    let mut off = phone_receipt("e-1", 5001, "9991234567", "tbank");
    off.transfer_type = TransferType::ToTbank;
    off.bank = None;
    let (off, _) = db.insert_receipt(off).await.unwrap();
    assert!(matcher.match_receipt(&off).await.unwrap().is_none());

    let mut incoming = phone_receipt("e-2", 5000, "9991234567", "tbank");
    incoming.transfer_type = TransferType::ToTbank;
    incoming.bank = None;
    let (receipt, _) = db.insert_receipt(incoming).await.unwrap();
    let event = matcher.match_receipt(&receipt).await.unwrap().expect("phone-only T-Bank receipt must match");
    assert_eq!(event.payout_id, PayoutId("p-1".into()));
    assert_eq!(event.transaction.id, tx.id);
    assert_eq!(event.transaction.status, TransactionStatus::ReceiptReceived);
}

#[tokio::test]
async fn a_receipt_matches_at_most_one_payout() {
    let (db, platform) = new_test_env().await;
    issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    issued_transaction(&db, &platform, "p-2", "+79991234567", 5000, "Сбербанк").await;
    let matcher = ReceiptMatcherApi::new(db.clone());

    let (receipt, _) = db.insert_receipt(phone_receipt("e-1", 5000, "89991234567", "Sber")).await.unwrap();
    let event = matcher.match_receipt(&receipt).await.unwrap().expect("must match one payout");
    // Both payouts pass every rule; the oldest wins.
    assert_eq!(event.payout_id, PayoutId("p-1".into()));

    // Re-running the matcher on the same receipt is a no-op.
    let linked = db.fetch_unmatched_receipts().await.unwrap();
    assert!(linked.is_empty() || linked.iter().all(|r| r.email_id != "e-1"));
    let again = matcher.match_receipt(&event.receipt).await.unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn sweep_processes_the_whole_queue() {
    let (db, platform) = new_test_env().await;
    issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    issued_transaction(&db, &platform, "p-2", "+79991234568", 7000, "Сбербанк").await;
    let matcher = ReceiptMatcherApi::new(db.clone());

    db.insert_receipt(phone_receipt("e-1", 5000, "89991234567", "Sber")).await.unwrap();
    db.insert_receipt(phone_receipt("e-2", 7000, "89991234568", "Sber")).await.unwrap();
    db.insert_receipt(phone_receipt("e-3", 9000, "89991234569", "Sber")).await.unwrap();

    let events = matcher.sweep().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(db.fetch_unmatched_receipts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn parse_failed_receipts_are_excluded_from_the_queue() {
    let (db, platform) = new_test_env().await;
    issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    let mut broken = phone_receipt("e-1", 5000, "89991234567", "Sber");
    broken.parse_error = Some("encrypted PDF".into());
    db.insert_receipt(broken).await.unwrap();

    let matcher = ReceiptMatcherApi::new(db.clone());
    assert!(matcher.sweep().await.unwrap().is_empty());
}

#[tokio::test]
async fn fuzzy_discovery_picks_the_closest_candidate_and_refuses_ties() {
    let (db, platform) = new_test_env().await;
    issued_transaction(&db, &platform, "p-1", "+79991234567", 5000, "Сбербанк").await;
    issued_transaction(&db, &platform, "p-2", "+79991234567", 5050, "Сбербанк").await;
    let matcher = ReceiptMatcherApi::new(db.clone());

    let (receipt, _) = db.insert_receipt(phone_receipt("e-1", 5040, "89991234567", "Sber")).await.unwrap();
    let payout = matcher.find_payout_fuzzy(&receipt).await.unwrap().expect("closest candidate expected");
    assert_eq!(payout.payout_id, PayoutId("p-2".into()));
    // Discovery never mutates.
    assert_eq!(db.fetch_unmatched_receipts().await.unwrap().len(), 1);

    // Equidistant candidates: refuse to guess.
    let (tied, _) = db.insert_receipt(phone_receipt("e-2", 5025, "89991234567", "Sber")).await.unwrap();
    assert!(matcher.find_payout_fuzzy(&tied).await.unwrap().is_none());

    // Out of tolerance entirely.
    let far = Rub::from_rubles(5000) + AMOUNT_TOLERANCE + Rub::from_rubles(51);
    let (hopeless, _) =
        db.insert_receipt(phone_receipt("e-3", far.value() / 100, "89991234567", "Sber")).await.unwrap();
    assert!(matcher.find_payout_fuzzy(&hopeless).await.unwrap().is_none());
}
