//! SubscriptionStore interface tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use punchcard::interfaces::SubscriptionStore;
use punchcard::model::{Plan, Subscription, SubscriptionStatus, UserId};

const TRIAL_DAYS: u32 = 14;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn paid(user_id: UserId, plan: Plan, days: i64) -> Subscription {
    let mut sub = Subscription::new_account(user_id, t0(), TRIAL_DAYS);
    sub.upgrade(plan, t0(), Duration::days(days), true).unwrap();
    sub
}

pub async fn test_create_is_idempotent<S: SubscriptionStore>(store: &S) {
    let user = UserId::new();
    let sub = Subscription::new_account(user, t0(), TRIAL_DAYS);

    assert!(store.create(&sub).await.unwrap(), "first create inserts");

    let mut other = sub.clone();
    other.plan = Plan::Tier3;
    other.end_date = Some(t0() + Duration::days(30));
    assert!(!store.create(&other).await.unwrap(), "second create is a no-op");

    let stored = store.get(user).await.unwrap().unwrap();
    assert_eq!(stored, sub, "existing subscription must be untouched");
}

pub async fn test_get_unknown_is_none<S: SubscriptionStore>(store: &S) {
    assert!(store.get(UserId::new()).await.unwrap().is_none());
}

pub async fn test_update_roundtrip<S: SubscriptionStore>(store: &S) {
    let user = UserId::new();
    let current = Subscription::new_account(user, t0(), TRIAL_DAYS);
    store.create(&current).await.unwrap();

    let upgraded = paid(user, Plan::Tier2, 365);
    assert!(store.update(&current, &upgraded).await.unwrap());
    assert_eq!(store.get(user).await.unwrap().unwrap(), upgraded);

    let mut cancelled = upgraded.clone();
    cancelled.cancel().unwrap();
    assert!(store.update(&upgraded, &cancelled).await.unwrap());
    assert_eq!(store.get(user).await.unwrap().unwrap(), cancelled);
}

pub async fn test_update_unknown_returns_false<S: SubscriptionStore>(store: &S) {
    let sub = paid(UserId::new(), Plan::Tier1, 30);
    assert!(!store.update(&sub, &sub).await.unwrap());
    assert!(store.get(sub.user_id).await.unwrap().is_none());
}

pub async fn test_update_rejects_stale_snapshot<S: SubscriptionStore>(store: &S) {
    let stale = paid(UserId::new(), Plan::Tier1, 30);
    store.create(&stale).await.unwrap();
    assert_eq!(store.expire_paid(t0() + Duration::days(31)).await.unwrap(), 1);
    let expired = store.get(stale.user_id).await.unwrap().unwrap();

    let mut cancelled = stale.clone();
    cancelled.cancel().unwrap();
    assert!(
        !store.update(&stale, &cancelled).await.unwrap(),
        "write based on a superseded read must not land"
    );
    assert_eq!(store.get(stale.user_id).await.unwrap().unwrap(), expired);
}

pub async fn test_update_leaves_trial_alone<S: SubscriptionStore>(store: &S) {
    let user = UserId::new();
    let current = Subscription::new_account(user, t0(), TRIAL_DAYS);
    store.create(&current).await.unwrap();
    assert_eq!(store.expire_trials(t0() + Duration::days(20)).await.unwrap(), 1);

    // The snapshot still shows the trial running; only the plan fields count
    let mut upgraded = current.clone();
    upgraded
        .upgrade(Plan::Tier3, t0(), Duration::days(30), false)
        .unwrap();
    assert!(store.update(&current, &upgraded).await.unwrap());

    let stored = store.get(user).await.unwrap().unwrap();
    assert_eq!(stored.plan, Plan::Tier3);
    assert!(stored.free_trial.used);
    assert!(!stored.free_trial.is_active);
}

pub async fn test_expire_paid_rewrites_only_lapsed<S: SubscriptionStore>(store: &S) {
    let lapsed = paid(UserId::new(), Plan::Tier1, 30);
    let current = paid(UserId::new(), Plan::Tier2, 365);
    let free = Subscription::new_account(UserId::new(), t0(), TRIAL_DAYS);
    let mut cancelled = paid(UserId::new(), Plan::Tier3, 30);
    cancelled.cancel().unwrap();

    for sub in [&lapsed, &current, &free, &cancelled] {
        store.create(sub).await.unwrap();
    }

    let now = t0() + Duration::days(31);
    assert_eq!(store.expire_paid(now).await.unwrap(), 2);

    for user in [lapsed.user_id, cancelled.user_id] {
        let stored = store.get(user).await.unwrap().unwrap();
        assert_eq!(stored.plan, Plan::Free);
        assert_eq!(stored.status, SubscriptionStatus::Expired);
        assert_eq!(stored.end_date, None);
        assert!(!stored.auto_renew);
        // The trial record is not part of the rewrite
        assert_eq!(stored.free_trial, lapsed.free_trial);
    }

    assert_eq!(store.get(current.user_id).await.unwrap().unwrap(), current);
    assert_eq!(store.get(free.user_id).await.unwrap().unwrap(), free);

    assert_eq!(
        store.expire_paid(now).await.unwrap(),
        0,
        "second run finds nothing left to expire"
    );
}

pub async fn test_expire_paid_boundary_is_strict<S: SubscriptionStore>(store: &S) {
    let sub = paid(UserId::new(), Plan::Tier1, 30);
    store.create(&sub).await.unwrap();
    let end = sub.end_date.unwrap();

    assert_eq!(store.expire_paid(end).await.unwrap(), 0);
    assert_eq!(
        store
            .expire_paid(end + Duration::milliseconds(1))
            .await
            .unwrap(),
        1
    );
}

pub async fn test_expire_trials<S: SubscriptionStore>(store: &S) {
    let early = Subscription::new_account(UserId::new(), t0(), TRIAL_DAYS);
    let late = Subscription::new_account(UserId::new(), t0() + Duration::days(10), TRIAL_DAYS);
    let upgraded = paid(UserId::new(), Plan::Tier1, 365);
    for sub in [&early, &late, &upgraded] {
        store.create(sub).await.unwrap();
    }

    let now = t0() + Duration::days(15);
    // `early` and `upgraded` both started their trial at t0
    assert_eq!(store.expire_trials(now).await.unwrap(), 2);

    let stored = store.get(early.user_id).await.unwrap().unwrap();
    assert!(!stored.free_trial.is_active);
    assert!(stored.free_trial.used);
    assert_eq!(stored.plan, Plan::Free, "trial expiry never changes the plan");

    let stored = store.get(upgraded.user_id).await.unwrap().unwrap();
    assert_eq!(stored.plan, Plan::Tier1);
    assert!(stored.free_trial.used);

    let stored = store.get(late.user_id).await.unwrap().unwrap();
    assert!(stored.free_trial.is_active);
    assert!(!stored.free_trial.used);

    assert_eq!(store.expire_trials(now).await.unwrap(), 0);
}

/// Run every subscription store contract test.
///
/// `$store` is expanded once per test so each test sees an empty store.
#[macro_export]
macro_rules! run_subscription_store_tests {
    ($store:expr) => {
        use $crate::storage::subscription_store_tests::*;

        test_create_is_idempotent($store).await;
        println!("  test_create_is_idempotent: PASSED");

        test_get_unknown_is_none($store).await;
        println!("  test_get_unknown_is_none: PASSED");

        test_update_roundtrip($store).await;
        println!("  test_update_roundtrip: PASSED");

        test_update_unknown_returns_false($store).await;
        println!("  test_update_unknown_returns_false: PASSED");

        test_update_rejects_stale_snapshot($store).await;
        println!("  test_update_rejects_stale_snapshot: PASSED");

        test_update_leaves_trial_alone($store).await;
        println!("  test_update_leaves_trial_alone: PASSED");

        test_expire_paid_rewrites_only_lapsed($store).await;
        println!("  test_expire_paid_rewrites_only_lapsed: PASSED");

        test_expire_paid_boundary_is_strict($store).await;
        println!("  test_expire_paid_boundary_is_strict: PASSED");

        test_expire_trials($store).await;
        println!("  test_expire_trials: PASSED");
    };
}
