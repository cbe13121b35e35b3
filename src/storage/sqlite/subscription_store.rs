//! SQLite SubscriptionStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Cond, Condition, Expr, OnConflict, Query, SimpleExpr, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::interfaces::{Result, SubscriptionStore};
use crate::model::{FreeTrial, Plan, Subscription, SubscriptionStatus, UserId};
use crate::storage::helpers::{
    format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp,
};
use crate::storage::schema::{Subscriptions, CREATE_SUBSCRIPTIONS_TABLE};

fn columns() -> [Subscriptions; 10] {
    [
        Subscriptions::UserId,
        Subscriptions::Plan,
        Subscriptions::Status,
        Subscriptions::StartDate,
        Subscriptions::EndDate,
        Subscriptions::AutoRenew,
        Subscriptions::TrialActive,
        Subscriptions::TrialStart,
        Subscriptions::TrialEnd,
        Subscriptions::TrialUsed,
    ]
}

fn values(subscription: &Subscription) -> [SimpleExpr; 10] {
    let trial = &subscription.free_trial;
    [
        subscription.user_id.to_string().into(),
        subscription.plan.as_str().into(),
        subscription.status.as_str().into(),
        format_timestamp(subscription.start_date).into(),
        subscription.end_date.map(format_timestamp).into(),
        i64::from(subscription.auto_renew).into(),
        i64::from(trial.is_active).into(),
        trial.start_date.map(format_timestamp).into(),
        trial.end_date.map(format_timestamp).into(),
        i64::from(trial.used).into(),
    ]
}

/// Plan fields, written by `update`. The trial columns are left out.
fn term_columns() -> [Subscriptions; 5] {
    [
        Subscriptions::Plan,
        Subscriptions::Status,
        Subscriptions::StartDate,
        Subscriptions::EndDate,
        Subscriptions::AutoRenew,
    ]
}

fn term_values(subscription: &Subscription) -> [SimpleExpr; 5] {
    [
        subscription.plan.as_str().into(),
        subscription.status.as_str().into(),
        format_timestamp(subscription.start_date).into(),
        subscription.end_date.map(format_timestamp).into(),
        i64::from(subscription.auto_renew).into(),
    ]
}

/// The user's row, still carrying the plan fields of `current`.
fn unchanged_terms(current: &Subscription) -> Condition {
    let end_date = match current.end_date {
        Some(end) => Expr::col(Subscriptions::EndDate).eq(format_timestamp(end)),
        None => Expr::col(Subscriptions::EndDate).is_null(),
    };
    Cond::all()
        .add(Expr::col(Subscriptions::UserId).eq(current.user_id.to_string()))
        .add(Expr::col(Subscriptions::Plan).eq(current.plan.as_str()))
        .add(Expr::col(Subscriptions::Status).eq(current.status.as_str()))
        .add(Expr::col(Subscriptions::StartDate).eq(format_timestamp(current.start_date)))
        .add(end_date)
        .add(Expr::col(Subscriptions::AutoRenew).eq(i64::from(current.auto_renew)))
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription> {
    let user_id: String = row.try_get("user_id")?;
    let plan: String = row.try_get("plan")?;
    let status: String = row.try_get("status")?;
    let start_date: String = row.try_get("start_date")?;

    Ok(Subscription {
        user_id: parse_column("user_id", &user_id)?,
        plan: parse_column::<Plan>("plan", &plan)?,
        status: parse_column::<SubscriptionStatus>("status", &status)?,
        start_date: parse_timestamp(&start_date)?,
        end_date: parse_optional_timestamp(row.try_get("end_date")?)?,
        auto_renew: row.try_get::<i64, _>("auto_renew")? != 0,
        free_trial: FreeTrial {
            is_active: row.try_get::<i64, _>("trial_active")? != 0,
            start_date: parse_optional_timestamp(row.try_get("trial_start")?)?,
            end_date: parse_optional_timestamp(row.try_get("trial_end")?)?,
            used: row.try_get::<i64, _>("trial_used")? != 0,
        },
    })
}

/// SQLite implementation of [`SubscriptionStore`].
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_SUBSCRIPTIONS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> Result<bool> {
        let query = Query::insert()
            .into_table(Subscriptions::Table)
            .columns(columns())
            .values_panic(values(subscription))
            .on_conflict(
                OnConflict::column(Subscriptions::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, user_id: UserId) -> Result<Option<Subscription>> {
        let query = Query::select()
            .columns(columns())
            .from(Subscriptions::Table)
            .and_where(Expr::col(Subscriptions::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    async fn update(&self, current: &Subscription, next: &Subscription) -> Result<bool> {
        let updates = term_columns().into_iter().zip(term_values(next));
        let query = Query::update()
            .table(Subscriptions::Table)
            .values(updates)
            .cond_where(unchanged_terms(current))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_paid(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = Query::update()
            .table(Subscriptions::Table)
            .values([
                (Subscriptions::Plan, Plan::Free.as_str().into()),
                (
                    Subscriptions::Status,
                    SubscriptionStatus::Expired.as_str().into(),
                ),
                (Subscriptions::EndDate, Option::<String>::None.into()),
                (Subscriptions::AutoRenew, 0i64.into()),
            ])
            .and_where(Expr::col(Subscriptions::Plan).ne(Plan::Free.as_str()))
            .and_where(Expr::col(Subscriptions::Status).ne(SubscriptionStatus::Expired.as_str()))
            .and_where(Expr::col(Subscriptions::EndDate).is_not_null())
            .and_where(Expr::col(Subscriptions::EndDate).lt(format_timestamp(now)))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn expire_trials(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = Query::update()
            .table(Subscriptions::Table)
            .values([
                (Subscriptions::TrialActive, 0i64.into()),
                (Subscriptions::TrialUsed, 1i64.into()),
            ])
            .and_where(Expr::col(Subscriptions::TrialActive).eq(1i64))
            .and_where(Expr::col(Subscriptions::TrialEnd).is_not_null())
            .and_where(Expr::col(Subscriptions::TrialEnd).lt(format_timestamp(now)))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
