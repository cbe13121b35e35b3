//! ReceiptStore + PointsStore interface tests.
//!
//! These tests verify the contract shared by every ledger backend. A ledger
//! implements both traits on one object so that a claim and its credit can
//! commit together.

use chrono::{DateTime, Duration, TimeZone, Utc};

use punchcard::identifier;
use punchcard::interfaces::{PointsStore, ReceiptStore};
use punchcard::model::{
    ClaimOutcome, Credit, Debit, DebitOutcome, EstablishmentId, HistoryFilter, HistoryKind,
    Metadata, PageRequest, Receipt, ReceiptFilter, Reconciliation, UserId, MAX_POINTS,
};
use punchcard::StorageError;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 9, 30, 0).unwrap() + Duration::nanoseconds(123_456_789)
}

pub fn make_receipt(establishment_id: EstablishmentId, amount: u64, at: DateTime<Utc>) -> Receipt {
    let mut metadata = Metadata::new();
    metadata.insert("till".to_string(), serde_json::json!(3));
    Receipt::new(
        identifier::generate(),
        establishment_id,
        amount,
        Some("+15550100".to_string()),
        metadata,
        at,
    )
}

pub fn credit(user_id: UserId, establishment_id: EstablishmentId, amount: u64) -> Credit {
    Credit {
        user_id,
        establishment_id,
        amount,
        receipt_id: None,
        description: format!("credit {amount}"),
    }
}

pub fn debit(user_id: UserId, establishment_id: EstablishmentId, amount: u64) -> Debit {
    Debit {
        user_id,
        establishment_id,
        amount,
        description: format!("debit {amount}"),
    }
}

// =============================================================================
// ReceiptStore
// =============================================================================

pub async fn test_insert_and_find<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let receipt = make_receipt(est, 100, t0());

    store.insert(&receipt).await.expect("insert should succeed");

    let found = store
        .find(&receipt.code, est)
        .await
        .expect("find should succeed")
        .expect("receipt should exist");
    assert_eq!(found, receipt, "stored receipt should round-trip exactly");
    assert!(store.code_exists(&receipt.code).await.unwrap());
}

pub async fn test_find_scoped_to_establishment<S: ReceiptStore + PointsStore>(store: &S) {
    let receipt = make_receipt(EstablishmentId::new(), 10, t0());
    store.insert(&receipt).await.unwrap();

    let other = store
        .find(&receipt.code, EstablishmentId::new())
        .await
        .unwrap();
    assert!(other.is_none(), "another establishment must not see the receipt");
    assert!(store.code_exists(&receipt.code).await.unwrap(), "codes are global");
}

pub async fn test_unknown_code_absent<S: ReceiptStore + PointsStore>(store: &S) {
    let code = identifier::generate();
    assert!(!store.code_exists(&code).await.unwrap());
    assert!(store
        .find(&code, EstablishmentId::new())
        .await
        .unwrap()
        .is_none());
    let outcome = store
        .claim(&code, EstablishmentId::new(), UserId::new(), t0())
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::NotFound);
}

pub async fn test_duplicate_code_rejected<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let first = make_receipt(est, 5, t0());
    store.insert(&first).await.unwrap();

    let mut second = make_receipt(EstablishmentId::new(), 7, t0());
    second.code = first.code.clone();
    let err = store
        .insert(&second)
        .await
        .expect_err("duplicate code should be rejected");
    assert!(
        matches!(err, StorageError::DuplicateIdentifier(_)),
        "expected DuplicateIdentifier, got {err:?}"
    );
    assert!(err.is_retryable());

    let kept = store.find(&first.code, est).await.unwrap().unwrap();
    assert_eq!(kept.amount, 5, "original receipt must be untouched");
}

pub async fn test_claim_credits_in_one_unit<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let user = UserId::new();
    let receipt = make_receipt(est, 100, t0());
    store.insert(&receipt).await.unwrap();

    let at = t0() + Duration::minutes(3);
    let outcome = store.claim(&receipt.code, est, user, at).await.unwrap();
    let ClaimOutcome::Claimed {
        receipt: claimed,
        balance,
    } = outcome
    else {
        panic!("expected Claimed, got {outcome:?}");
    };

    assert!(claimed.claimed);
    assert_eq!(claimed.claimed_by, Some(user));
    assert_eq!(claimed.claimed_at, Some(at));
    assert_eq!(balance.amount, 100);

    let stored = store.find(&receipt.code, est).await.unwrap().unwrap();
    assert_eq!(stored, claimed);

    let history = store.pair_history(user, est).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, HistoryKind::Earned);
    assert_eq!(history[0].amount, 100);
    assert_eq!(history[0].receipt_id, Some(receipt.id));
    assert_eq!(history[0].balance_after, 100);
    assert_eq!(
        history[0].description,
        format!("Claimed receipt {}", receipt.code)
    );
}

pub async fn test_claim_twice_already_claimed<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let first = UserId::new();
    let second = UserId::new();
    let receipt = make_receipt(est, 40, t0());
    store.insert(&receipt).await.unwrap();

    store.claim(&receipt.code, est, first, t0()).await.unwrap();
    let again = store
        .claim(&receipt.code, est, second, t0() + Duration::seconds(1))
        .await
        .unwrap();

    match again {
        ClaimOutcome::AlreadyClaimed(r) => assert_eq!(r.claimed_by, Some(first)),
        other => panic!("expected AlreadyClaimed, got {other:?}"),
    }
    assert!(store.balance(second, est).await.unwrap().is_none());
    assert_eq!(store.balance(first, est).await.unwrap().unwrap().amount, 40);
    assert_eq!(store.pair_history(first, est).await.unwrap().len(), 1);
}

pub async fn test_claim_wrong_establishment_not_found<S: ReceiptStore + PointsStore>(store: &S) {
    let receipt = make_receipt(EstablishmentId::new(), 10, t0());
    store.insert(&receipt).await.unwrap();

    let outcome = store
        .claim(&receipt.code, EstablishmentId::new(), UserId::new(), t0())
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::NotFound);
}

pub async fn test_list_newest_first_and_filtered<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let mut receipts = Vec::new();
    for i in 0..5u64 {
        let receipt = make_receipt(est, i + 1, t0() + Duration::seconds(i as i64));
        store.insert(&receipt).await.unwrap();
        receipts.push(receipt);
    }
    // Noise from another establishment
    store
        .insert(&make_receipt(EstablishmentId::new(), 1, t0()))
        .await
        .unwrap();
    store
        .claim(&receipts[4].code, est, UserId::new(), t0() + Duration::minutes(1))
        .await
        .unwrap();

    let page = store
        .list(est, ReceiptFilter::default(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages(), 3);
    let amounts: Vec<u64> = page.items.iter().map(|r| r.amount).collect();
    assert_eq!(amounts, vec![5, 4]);

    let last = store
        .list(est, ReceiptFilter::default(), PageRequest::new(3, 2))
        .await
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].amount, 1);

    let unclaimed = store
        .list(
            est,
            ReceiptFilter {
                claimed: Some(false),
            },
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(unclaimed.total, 4);
    assert!(unclaimed.items.iter().all(|r| !r.claimed));

    let claimed = store
        .list(
            est,
            ReceiptFilter { claimed: Some(true) },
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(claimed.total, 1);
    assert_eq!(claimed.items[0].amount, 5);
}

// =============================================================================
// PointsStore
// =============================================================================

pub async fn test_credit_and_debit_track_balance<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let user = UserId::new();

    let balance = store.credit(credit(user, est, 100), t0()).await.unwrap();
    assert_eq!(balance.amount, 100);

    let outcome = store
        .debit(debit(user, est, 40), t0() + Duration::seconds(1))
        .await
        .unwrap();
    match outcome {
        DebitOutcome::Debited(b) => assert_eq!(b.amount, 60),
        other => panic!("expected Debited, got {other:?}"),
    }

    let stored = store.balance(user, est).await.unwrap().unwrap();
    assert_eq!(stored.amount, 60);
    assert_eq!(stored.updated_at, t0() + Duration::seconds(1));

    let history = store.pair_history(user, est).await.unwrap();
    let after: Vec<u64> = history.iter().map(|e| e.balance_after).collect();
    assert_eq!(after, vec![100, 60]);
}

pub async fn test_debit_insufficient_changes_nothing<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let user = UserId::new();
    store.credit(credit(user, est, 10), t0()).await.unwrap();

    let outcome = store.debit(debit(user, est, 11), t0()).await.unwrap();
    assert_eq!(outcome, DebitOutcome::Insufficient { available: 10 });
    assert_eq!(store.balance(user, est).await.unwrap().unwrap().amount, 10);
    assert_eq!(store.pair_history(user, est).await.unwrap().len(), 1);

    let nobody = store
        .debit(debit(UserId::new(), est, 1), t0())
        .await
        .unwrap();
    assert_eq!(nobody, DebitOutcome::Insufficient { available: 0 });
}

pub async fn test_balances_for_user<S: ReceiptStore + PointsStore>(store: &S) {
    let user = UserId::new();
    let mut establishments = vec![EstablishmentId::new(), EstablishmentId::new()];
    for (i, est) in establishments.iter().enumerate() {
        store
            .credit(credit(user, *est, (i as u64 + 1) * 10), t0())
            .await
            .unwrap();
    }
    establishments.sort();

    let balances = store.balances_for_user(user).await.unwrap();
    let ids: Vec<EstablishmentId> = balances.iter().map(|b| b.establishment_id).collect();
    assert_eq!(ids, establishments);
    assert!(store.balances_for_user(UserId::new()).await.unwrap().is_empty());
}

pub async fn test_history_newest_first_with_filters<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let alice = UserId::new();
    let bob = UserId::new();

    store.credit(credit(alice, est, 10), t0()).await.unwrap();
    store
        .credit(credit(bob, est, 20), t0() + Duration::seconds(1))
        .await
        .unwrap();
    store
        .debit(debit(alice, est, 5), t0() + Duration::seconds(2))
        .await
        .unwrap();

    let all = store
        .history(est, HistoryFilter::default(), PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    let amounts: Vec<u64> = all.items.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![5, 20, 10]);

    let alice_earned = store
        .history(
            est,
            HistoryFilter {
                user_id: Some(alice),
                kind: Some(HistoryKind::Earned),
            },
            PageRequest::new(1, 10),
        )
        .await
        .unwrap();
    assert_eq!(alice_earned.total, 1);
    assert_eq!(alice_earned.items[0].amount, 10);

    let second_page = store
        .history(est, HistoryFilter::default(), PageRequest::new(2, 2))
        .await
        .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].amount, 10);
}

pub async fn test_history_folds_to_balance<S: ReceiptStore + PointsStore>(store: &S) {
    let est = EstablishmentId::new();
    let user = UserId::new();
    let receipt = make_receipt(est, 75, t0());
    store.insert(&receipt).await.unwrap();

    store.claim(&receipt.code, est, user, t0()).await.unwrap();
    store
        .credit(credit(user, est, 5), t0() + Duration::seconds(1))
        .await
        .unwrap();
    store
        .debit(debit(user, est, 30), t0() + Duration::seconds(2))
        .await
        .unwrap();
    store
        .debit(debit(user, est, 100), t0() + Duration::seconds(3))
        .await
        .unwrap();

    let balance = store.balance(user, est).await.unwrap().unwrap().amount;
    let history = store.pair_history(user, est).await.unwrap();
    let reconciliation = Reconciliation::from_history(balance, &history);

    assert_eq!(balance, 50);
    assert_eq!(reconciliation.entries, 3);
    assert!(reconciliation.is_consistent());
}

pub async fn test_balance_ceiling_rejects_credit<S: PointsStore>(store: &S) {
    let user = UserId::new();
    let est = EstablishmentId::new();
    store.credit(credit(user, est, MAX_POINTS), t0()).await.unwrap();

    let result = store.credit(credit(user, est, 1), t0()).await;
    assert!(matches!(result, Err(StorageError::Unsupported(_))));

    let balance = store.balance(user, est).await.unwrap().unwrap();
    assert_eq!(balance.amount, MAX_POINTS);
    assert_eq!(store.pair_history(user, est).await.unwrap().len(), 1);
}

/// Run every ledger contract test.
///
/// `$store` is expanded once per test, so pass an expression that builds a
/// fresh store (e.g. `&MemoryLedger::new()`).
#[macro_export]
macro_rules! run_ledger_tests {
    ($store:expr) => {
        use $crate::storage::ledger_tests::*;

        test_insert_and_find($store).await;
        println!("  test_insert_and_find: PASSED");

        test_find_scoped_to_establishment($store).await;
        println!("  test_find_scoped_to_establishment: PASSED");

        test_unknown_code_absent($store).await;
        println!("  test_unknown_code_absent: PASSED");

        test_duplicate_code_rejected($store).await;
        println!("  test_duplicate_code_rejected: PASSED");

        test_claim_credits_in_one_unit($store).await;
        println!("  test_claim_credits_in_one_unit: PASSED");

        test_claim_twice_already_claimed($store).await;
        println!("  test_claim_twice_already_claimed: PASSED");

        test_claim_wrong_establishment_not_found($store).await;
        println!("  test_claim_wrong_establishment_not_found: PASSED");

        test_list_newest_first_and_filtered($store).await;
        println!("  test_list_newest_first_and_filtered: PASSED");

        test_credit_and_debit_track_balance($store).await;
        println!("  test_credit_and_debit_track_balance: PASSED");

        test_debit_insufficient_changes_nothing($store).await;
        println!("  test_debit_insufficient_changes_nothing: PASSED");

        test_balances_for_user($store).await;
        println!("  test_balances_for_user: PASSED");

        test_history_newest_first_with_filters($store).await;
        println!("  test_history_newest_first_with_filters: PASSED");

        test_history_folds_to_balance($store).await;
        println!("  test_history_folds_to_balance: PASSED");

        test_balance_ceiling_rejects_credit($store).await;
        println!("  test_balance_ceiling_rejects_credit: PASSED");
    };
}
