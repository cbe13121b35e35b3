use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::clock::ManualClock;
use crate::config::SubscriptionConfig;
use crate::entitlement::EffectivePlan;
use crate::model::{BillingCycle, Plan};
use crate::services::SubscriptionService;
use crate::storage::{MemorySubscriptionStore, MemoryUsageStore};

struct Fixture {
    entitlements: EntitlementService,
    subscriptions: SubscriptionService,
    clock: Arc<ManualClock>,
}

fn setup() -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap(),
    ));
    let store = Arc::new(MemorySubscriptionStore::new());
    Fixture {
        entitlements: EntitlementService::new(
            store.clone(),
            Arc::new(MemoryUsageStore::new()),
            clock.clone(),
        ),
        subscriptions: SubscriptionService::new(store, clock.clone(), SubscriptionConfig::default()),
        clock,
    }
}

/// A user whose trial has already ended.
async fn free_user(f: &Fixture) -> UserId {
    let user = UserId::new();
    f.subscriptions.start(user).await.unwrap();
    f.clock.advance(Duration::days(15));
    user
}

#[tokio::test]
async fn test_trial_user_is_unlimited() {
    let f = setup();
    let user = UserId::new();
    f.subscriptions.start(user).await.unwrap();

    let ent = f.entitlements.resolve(user).await.unwrap();
    assert_eq!(ent.effective_plan, EffectivePlan::FreeTrial);

    for _ in 0..50 {
        f.entitlements
            .record(user, ActionType::VoiceInput)
            .await
            .unwrap();
    }
    assert!(f.entitlements.check(user, ActionType::Partner).await.unwrap());
}

#[tokio::test]
async fn test_free_user_hits_daily_voice_limit() {
    let f = setup();
    let user = free_user(&f).await;

    for expected in 1..=3 {
        let report = f
            .entitlements
            .record(user, ActionType::VoiceInput)
            .await
            .unwrap();
        assert_eq!(report.used, expected);
    }

    assert!(!f.entitlements.check(user, ActionType::VoiceInput).await.unwrap());
    let err = f
        .entitlements
        .record(user, ActionType::VoiceInput)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::QuotaExceeded {
            action: ActionType::VoiceInput,
            used: 3,
            limit: 3
        }
    ));

    // Next day the counter reads zero even without a scheduler run
    f.clock.advance(Duration::days(1));
    assert!(f.entitlements.check(user, ActionType::VoiceInput).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_respect_limit() {
    let f = setup();
    let user = free_user(&f).await;
    let entitlements = Arc::new(f.entitlements);

    let handles = (0..12).map(|_| {
        let entitlements = entitlements.clone();
        tokio::spawn(async move { entitlements.record(user, ActionType::Expense).await })
    });
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let recorded = results.iter().filter(|r| r.is_ok()).count();
    let limit = match entitlements.report(user, ActionType::Expense).await.unwrap().limit {
        Limit::Limited(max) => max as usize,
        Limit::Unlimited => panic!("free plan limits expenses"),
    };
    assert_eq!(recorded, limit);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, Error::QuotaExceeded { .. })));

    let report = entitlements.report(user, ActionType::Expense).await.unwrap();
    assert_eq!(report.used as usize, limit);
}

#[tokio::test]
async fn test_free_user_cannot_add_partners() {
    let f = setup();
    let user = free_user(&f).await;

    let report = f
        .entitlements
        .report(user, ActionType::Partner)
        .await
        .unwrap();
    assert_eq!(report.limit, Limit::Limited(0));
    assert_eq!(report.remaining, Limit::Limited(0));
    assert!(f.entitlements.record(user, ActionType::Partner).await.is_err());
}

#[tokio::test]
async fn test_paid_plan_limits_and_release() {
    let f = setup();
    let user = free_user(&f).await;
    f.subscriptions
        .upgrade(user, Plan::Tier1, BillingCycle::Monthly, false)
        .await
        .unwrap();

    f.entitlements.record(user, ActionType::Partner).await.unwrap();
    f.entitlements.record(user, ActionType::Partner).await.unwrap();
    assert!(!f.entitlements.check(user, ActionType::Partner).await.unwrap());

    let report = f
        .entitlements
        .release(user, ActionType::Partner)
        .await
        .unwrap();
    assert_eq!(report.used, 1);
    assert_eq!(report.remaining, Limit::Limited(1));
}

#[tokio::test]
async fn test_expired_plan_resolves_free_before_scheduler() {
    let f = setup();
    let user = free_user(&f).await;
    f.subscriptions
        .upgrade(user, Plan::Tier3, BillingCycle::Monthly, false)
        .await
        .unwrap();

    f.clock.advance(Duration::days(31));
    let ent = f.entitlements.resolve(user).await.unwrap();
    assert_eq!(ent.effective_plan, EffectivePlan::Plan(Plan::Free));
    assert_eq!(
        f.subscriptions.get(user).await.unwrap().plan,
        Plan::Tier3,
        "stored row untouched until the expiry job runs"
    );
}

#[tokio::test]
async fn test_missing_usage_reads_as_zero() {
    let f = setup();
    let user = free_user(&f).await;

    let report = f
        .entitlements
        .report(user, ActionType::Revenue)
        .await
        .unwrap();
    assert_eq!(report.used, 0);
    assert_eq!(report.remaining, Limit::Limited(3));
}

#[tokio::test]
async fn test_missing_subscription_is_not_found() {
    let f = setup();
    let result = f.entitlements.check(UserId::new(), ActionType::Expense).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}
