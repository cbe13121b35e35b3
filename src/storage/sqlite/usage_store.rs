//! SQLite UsageStore implementation.
//!
//! Counter changes are read-modify-write inside `BEGIN IMMEDIATE`, applying
//! the same model methods as the in-memory store. Bulk resets are set-based.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Cond, Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::WriteTx;
use crate::entitlement::Limit;
use crate::interfaces::{Result, UsageStore};
use crate::model::{
    ActionType, Bucket, Counter, DailyUsage, MonthlyUsage, QuotaOutcome, TotalUsage,
    UsageTracking, UserId,
};
use crate::storage::helpers::{amount_from_db, count_from_db, format_timestamp, parse_column, parse_timestamp};
use crate::storage::schema::{UsageTracking as Usage, CREATE_USAGE_TABLE};

fn columns() -> [Usage; 10] {
    [
        Usage::UserId,
        Usage::VoiceInputs,
        Usage::VoiceInputsReset,
        Usage::Expenses,
        Usage::ExpensesReset,
        Usage::Revenues,
        Usage::RevenuesReset,
        Usage::Supervisors,
        Usage::Projects,
        Usage::Partners,
    ]
}

fn counter_from_row(row: &SqliteRow, count: &str, reset: &str) -> Result<Counter> {
    let last_reset: String = row.try_get(reset)?;
    Ok(Counter {
        count: count_from_db(row.try_get(count)?)?,
        last_reset: parse_timestamp(&last_reset)?,
    })
}

fn usage_from_row(row: &SqliteRow) -> Result<UsageTracking> {
    let user_id: String = row.try_get("user_id")?;
    Ok(UsageTracking {
        user_id: parse_column("user_id", &user_id)?,
        daily: DailyUsage {
            voice_inputs: counter_from_row(row, "voice_inputs", "voice_inputs_reset")?,
            expenses: counter_from_row(row, "expenses", "expenses_reset")?,
        },
        monthly: MonthlyUsage {
            revenues: counter_from_row(row, "revenues", "revenues_reset")?,
        },
        total: TotalUsage {
            supervisors: count_from_db(row.try_get("supervisors")?)?,
            projects: count_from_db(row.try_get("projects")?)?,
            partners: count_from_db(row.try_get("partners")?)?,
        },
    })
}

/// Counter columns belonging to a reset bucket, as (count, last_reset) pairs.
fn bucket_columns(bucket: Bucket) -> &'static [(Usage, Usage)] {
    match bucket {
        Bucket::Daily => &[
            (Usage::VoiceInputs, Usage::VoiceInputsReset),
            (Usage::Expenses, Usage::ExpensesReset),
        ],
        Bucket::Monthly => &[(Usage::Revenues, Usage::RevenuesReset)],
        Bucket::Total => &[],
    }
}

/// SQLite implementation of [`UsageStore`].
pub struct SqliteUsageStore {
    pool: SqlitePool,
}

impl SqliteUsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_USAGE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn get_in_tx(
        conn: &mut SqliteConnection,
        user_id: UserId,
    ) -> Result<Option<UsageTracking>> {
        let query = Query::select()
            .columns(columns())
            .from(Usage::Table)
            .and_where(Expr::col(Usage::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        row.as_ref().map(usage_from_row).transpose()
    }

    async fn write(conn: &mut SqliteConnection, usage: &UsageTracking) -> Result<()> {
        let query = Query::insert()
            .into_table(Usage::Table)
            .columns(columns())
            .values_panic([
                usage.user_id.to_string().into(),
                i64::from(usage.daily.voice_inputs.count).into(),
                format_timestamp(usage.daily.voice_inputs.last_reset).into(),
                i64::from(usage.daily.expenses.count).into(),
                format_timestamp(usage.daily.expenses.last_reset).into(),
                i64::from(usage.monthly.revenues.count).into(),
                format_timestamp(usage.monthly.revenues.last_reset).into(),
                i64::from(usage.total.supervisors).into(),
                i64::from(usage.total.projects).into(),
                i64::from(usage.total.partners).into(),
            ])
            .on_conflict(
                OnConflict::column(Usage::UserId)
                    .update_columns(columns().into_iter().skip(1))
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn adjust_in_tx(
        conn: &mut SqliteConnection,
        user_id: UserId,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut UsageTracking) + Send,
    ) -> Result<UsageTracking> {
        let mut usage = Self::get_in_tx(conn, user_id)
            .await?
            .unwrap_or_else(|| UsageTracking::new(user_id, now));
        apply(&mut usage);
        Self::write(conn, &usage).await?;
        Ok(usage)
    }

    async fn increment_within_in_tx(
        conn: &mut SqliteConnection,
        user_id: UserId,
        action: ActionType,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome> {
        let mut usage = Self::get_in_tx(conn, user_id)
            .await?
            .unwrap_or_else(|| UsageTracking::new(user_id, now));
        if !usage.increment_within(action, limit, now) {
            return Ok(QuotaOutcome::Exceeded {
                used: usage.used(action, now),
            });
        }
        Self::write(conn, &usage).await?;
        Ok(QuotaOutcome::Recorded(usage))
    }

    async fn reset_in_tx(
        conn: &mut SqliteConnection,
        bucket: Bucket,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let pairs = bucket_columns(bucket);
        let cutoff = format_timestamp(cutoff);
        let stale_any = pairs.iter().fold(Cond::any(), |cond, (_, reset)| {
            cond.add(Expr::col(*reset).lte(cutoff.clone()))
        });

        let count_query = Query::select()
            .expr(Expr::col(Usage::UserId).count())
            .from(Usage::Table)
            .cond_where(stale_any)
            .to_string(SqliteQueryBuilder);
        let users: i64 = sqlx::query(&count_query)
            .fetch_one(&mut *conn)
            .await?
            .try_get(0)?;

        for (count, reset) in pairs {
            let query = Query::update()
                .table(Usage::Table)
                .values([(*count, 0i64.into()), (*reset, format_timestamp(now).into())])
                .and_where(Expr::col(*reset).lte(cutoff.clone()))
                .to_string(SqliteQueryBuilder);
            sqlx::query(&query).execute(&mut *conn).await?;
        }

        amount_from_db(users)
    }
}

#[async_trait]
impl UsageStore for SqliteUsageStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UsageTracking>> {
        let query = Query::select()
            .columns(columns())
            .from(Usage::Table)
            .and_where(Expr::col(Usage::UserId).eq(user_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(usage_from_row).transpose()
    }

    async fn increment(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::adjust_in_tx(tx.conn(), user_id, now, |usage| {
            usage.increment(action, now)
        })
        .await;
        tx.finish(result).await
    }

    async fn increment_within(
        &self,
        user_id: UserId,
        action: ActionType,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::increment_within_in_tx(tx.conn(), user_id, action, limit, now).await;
        tx.finish(result).await
    }

    async fn decrement(
        &self,
        user_id: UserId,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> Result<UsageTracking> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::adjust_in_tx(tx.conn(), user_id, now, |usage| {
            usage.decrement(action, now)
        })
        .await;
        tx.finish(result).await
    }

    async fn reset_stale(&self, bucket: Bucket, now: DateTime<Utc>) -> Result<u64> {
        let Some(cutoff) = bucket.stale_cutoff(now) else {
            return Ok(0);
        };

        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::reset_in_tx(tx.conn(), bucket, cutoff, now).await;
        tx.finish(result).await
    }
}
