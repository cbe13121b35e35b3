//! UsageStore interface tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use punchcard::entitlement::Limit;
use punchcard::interfaces::UsageStore;
use punchcard::model::{ActionType, Bucket, QuotaOutcome, UserId};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 8, 0, 0).unwrap()
}

pub async fn test_get_unknown_is_none<S: UsageStore>(store: &S) {
    assert!(store.get(UserId::new()).await.unwrap().is_none());
}

pub async fn test_increment_creates_and_counts<S: UsageStore>(store: &S) {
    let user = UserId::new();

    store
        .increment(user, ActionType::Expense, t0())
        .await
        .unwrap();
    let usage = store
        .increment(user, ActionType::Expense, t0() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(usage.daily.expenses.count, 2);
    assert_eq!(usage.daily.expenses.last_reset, t0());

    store
        .increment(user, ActionType::Partner, t0())
        .await
        .unwrap();
    let stored = store.get(user).await.unwrap().unwrap();
    assert_eq!(stored.user_id, user);
    assert_eq!(stored.daily.expenses.count, 2);
    assert_eq!(stored.daily.voice_inputs.count, 0, "only one counter moves");
    assert_eq!(stored.total.partners, 1);
    assert_eq!(stored.monthly.revenues.count, 0);
}

pub async fn test_increment_within_stops_at_limit<S: UsageStore>(store: &S) {
    let user = UserId::new();
    let limit = Limit::Limited(2);

    for expected in 1..=2 {
        let outcome = store
            .increment_within(user, ActionType::Expense, limit, t0())
            .await
            .unwrap();
        match outcome {
            QuotaOutcome::Recorded(usage) => assert_eq!(usage.daily.expenses.count, expected),
            other => panic!("expected a recorded use, got {other:?}"),
        }
    }

    let outcome = store
        .increment_within(user, ActionType::Expense, limit, t0())
        .await
        .unwrap();
    assert_eq!(outcome, QuotaOutcome::Exceeded { used: 2 });
    assert_eq!(store.get(user).await.unwrap().unwrap().daily.expenses.count, 2);

    // Next day the stale counter no longer counts against the limit
    let tomorrow = t0() + Duration::hours(25);
    let outcome = store
        .increment_within(user, ActionType::Expense, limit, tomorrow)
        .await
        .unwrap();
    assert!(matches!(outcome, QuotaOutcome::Recorded(ref u) if u.daily.expenses.count == 1));

    let outcome = store
        .increment_within(UserId::new(), ActionType::Partner, Limit::Limited(0), t0())
        .await
        .unwrap();
    assert_eq!(outcome, QuotaOutcome::Exceeded { used: 0 });

    for _ in 0..5 {
        store
            .increment_within(user, ActionType::Project, Limit::Unlimited, t0())
            .await
            .unwrap();
    }
    assert_eq!(store.get(user).await.unwrap().unwrap().total.projects, 5);
}

pub async fn test_decrement_floors_at_zero<S: UsageStore>(store: &S) {
    let user = UserId::new();
    store
        .increment(user, ActionType::Project, t0())
        .await
        .unwrap();

    let usage = store
        .decrement(user, ActionType::Project, t0())
        .await
        .unwrap();
    assert_eq!(usage.total.projects, 0);

    let usage = store
        .decrement(user, ActionType::Project, t0())
        .await
        .unwrap();
    assert_eq!(usage.total.projects, 0);

    let usage = store
        .decrement(UserId::new(), ActionType::VoiceInput, t0())
        .await
        .unwrap();
    assert_eq!(usage.daily.voice_inputs.count, 0);
}

pub async fn test_stale_counter_restarts_on_increment<S: UsageStore>(store: &S) {
    let user = UserId::new();
    for _ in 0..3 {
        store
            .increment(user, ActionType::VoiceInput, t0())
            .await
            .unwrap();
    }

    let later = t0() + Duration::hours(25);
    let usage = store
        .increment(user, ActionType::VoiceInput, later)
        .await
        .unwrap();
    assert_eq!(usage.daily.voice_inputs.count, 1);
    assert_eq!(usage.daily.voice_inputs.last_reset, later);
}

pub async fn test_reset_daily<S: UsageStore>(store: &S) {
    let stale = UserId::new();
    let fresh = UserId::new();
    store
        .increment(stale, ActionType::Expense, t0())
        .await
        .unwrap();
    store
        .increment(stale, ActionType::Revenue, t0())
        .await
        .unwrap();
    store
        .increment(fresh, ActionType::Expense, t0() + Duration::hours(20))
        .await
        .unwrap();

    let now = t0() + Duration::hours(24);
    assert_eq!(store.reset_stale(Bucket::Daily, now).await.unwrap(), 1);

    let usage = store.get(stale).await.unwrap().unwrap();
    assert_eq!(usage.daily.expenses.count, 0);
    assert_eq!(usage.daily.expenses.last_reset, now);
    assert_eq!(usage.daily.voice_inputs.last_reset, now);
    assert_eq!(usage.monthly.revenues.count, 1, "monthly counter untouched");

    let usage = store.get(fresh).await.unwrap().unwrap();
    assert_eq!(usage.daily.expenses.count, 1);

    assert_eq!(store.reset_stale(Bucket::Daily, now).await.unwrap(), 0);
}

pub async fn test_reset_monthly<S: UsageStore>(store: &S) {
    let user = UserId::new();
    store
        .increment(user, ActionType::Revenue, t0())
        .await
        .unwrap();

    let almost = t0() + Duration::days(30);
    assert_eq!(store.reset_stale(Bucket::Monthly, almost).await.unwrap(), 0);

    let now = t0() + Duration::days(31);
    assert_eq!(store.reset_stale(Bucket::Monthly, now).await.unwrap(), 1);
    let usage = store.get(user).await.unwrap().unwrap();
    assert_eq!(usage.monthly.revenues.count, 0);
    assert_eq!(usage.monthly.revenues.last_reset, now);
}

pub async fn test_reset_total_is_noop<S: UsageStore>(store: &S) {
    let user = UserId::new();
    store
        .increment(user, ActionType::Supervisor, t0())
        .await
        .unwrap();

    let later = t0() + Duration::days(400);
    assert_eq!(store.reset_stale(Bucket::Total, later).await.unwrap(), 0);
    assert_eq!(store.get(user).await.unwrap().unwrap().total.supervisors, 1);
}

/// Run every usage store contract test.
///
/// `$store` is expanded once per test so each test sees an empty store.
#[macro_export]
macro_rules! run_usage_store_tests {
    ($store:expr) => {
        use $crate::storage::usage_store_tests::*;

        test_get_unknown_is_none($store).await;
        println!("  test_get_unknown_is_none: PASSED");

        test_increment_creates_and_counts($store).await;
        println!("  test_increment_creates_and_counts: PASSED");

        test_increment_within_stops_at_limit($store).await;
        println!("  test_increment_within_stops_at_limit: PASSED");

        test_decrement_floors_at_zero($store).await;
        println!("  test_decrement_floors_at_zero: PASSED");

        test_stale_counter_restarts_on_increment($store).await;
        println!("  test_stale_counter_restarts_on_increment: PASSED");

        test_reset_daily($store).await;
        println!("  test_reset_daily: PASSED");

        test_reset_monthly($store).await;
        println!("  test_reset_monthly: PASSED");

        test_reset_total_is_noop($store).await;
        println!("  test_reset_total_is_noop: PASSED");
    };
}
