//! SQLite ReceiptStore and PointsStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Cond, Condition, Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::WriteTx;
use crate::error::StorageError;
use crate::identifier::ReceiptCode;
use crate::interfaces::{PointsStore, ReceiptStore, Result};
use crate::model::{
    Balance, ClaimOutcome, Credit, Debit, DebitOutcome, EstablishmentId, HistoryEntry,
    HistoryFilter, HistoryKind, Page, PageRequest, Receipt, ReceiptFilter, UserId,
};
use crate::storage::helpers::{
    amount_from_db, amount_to_db, format_timestamp, parse_column, parse_optional_timestamp,
    parse_timestamp,
};
use crate::storage::schema::{Balances, PointsHistory, Receipts, CREATE_LEDGER_TABLES};

fn receipt_columns() -> [Receipts; 10] {
    [
        Receipts::Id,
        Receipts::Code,
        Receipts::EstablishmentId,
        Receipts::Amount,
        Receipts::Claimed,
        Receipts::ClaimedBy,
        Receipts::ClaimedAt,
        Receipts::CustomerPhone,
        Receipts::Metadata,
        Receipts::CreatedAt,
    ]
}

fn history_columns() -> [PointsHistory; 8] {
    [
        PointsHistory::Kind,
        PointsHistory::Amount,
        PointsHistory::UserId,
        PointsHistory::EstablishmentId,
        PointsHistory::ReceiptId,
        PointsHistory::Description,
        PointsHistory::BalanceAfter,
        PointsHistory::CreatedAt,
    ]
}

fn receipt_from_row(row: &SqliteRow) -> Result<Receipt> {
    let id: String = row.try_get("id")?;
    let code: String = row.try_get("code")?;
    let establishment_id: String = row.try_get("establishment_id")?;
    let claimed_by: Option<String> = row.try_get("claimed_by")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Receipt {
        id: parse_column("id", &id)?,
        code: ReceiptCode::parse(&code).map_err(StorageError::Corrupt)?,
        establishment_id: parse_column("establishment_id", &establishment_id)?,
        amount: amount_from_db(row.try_get("amount")?)?,
        claimed: row.try_get::<i64, _>("claimed")? != 0,
        claimed_by: claimed_by
            .map(|raw| parse_column("claimed_by", &raw))
            .transpose()?,
        claimed_at: parse_optional_timestamp(row.try_get("claimed_at")?)?,
        customer_phone: row.try_get("customer_phone")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryEntry> {
    let kind: String = row.try_get("kind")?;
    let user_id: String = row.try_get("user_id")?;
    let establishment_id: String = row.try_get("establishment_id")?;
    let receipt_id: Option<String> = row.try_get("receipt_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(HistoryEntry {
        kind: parse_column("kind", &kind)?,
        amount: amount_from_db(row.try_get("amount")?)?,
        user_id: parse_column("user_id", &user_id)?,
        establishment_id: parse_column("establishment_id", &establishment_id)?,
        receipt_id: receipt_id
            .map(|raw| parse_column("receipt_id", &raw))
            .transpose()?,
        description: row.try_get("description")?,
        balance_after: amount_from_db(row.try_get("balance_after")?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn balance_from_row(row: &SqliteRow) -> Result<Balance> {
    let user_id: String = row.try_get("user_id")?;
    let establishment_id: String = row.try_get("establishment_id")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Balance {
        user_id: parse_column("user_id", &user_id)?,
        establishment_id: parse_column("establishment_id", &establishment_id)?,
        amount: amount_from_db(row.try_get("amount")?)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn receipt_condition(establishment_id: EstablishmentId, filter: &ReceiptFilter) -> Condition {
    Cond::all()
        .add(Expr::col(Receipts::EstablishmentId).eq(establishment_id.to_string()))
        .add_option(
            filter
                .claimed
                .map(|claimed| Expr::col(Receipts::Claimed).eq(i64::from(claimed))),
        )
}

fn history_condition(establishment_id: EstablishmentId, filter: &HistoryFilter) -> Condition {
    Cond::all()
        .add(Expr::col(PointsHistory::EstablishmentId).eq(establishment_id.to_string()))
        .add_option(
            filter
                .user_id
                .map(|user| Expr::col(PointsHistory::UserId).eq(user.to_string())),
        )
        .add_option(
            filter
                .kind
                .map(|kind| Expr::col(PointsHistory::Kind).eq(kind.as_str())),
        )
}

/// SQLite implementation of [`ReceiptStore`] and [`PointsStore`].
///
/// Both traits share one pool so a claim and its credit commit together.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Create a new SQLite ledger.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_LEDGER_TABLES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn balance_in_tx(
        conn: &mut SqliteConnection,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Option<u64>> {
        let query = Query::select()
            .column(Balances::Amount)
            .from(Balances::Table)
            .and_where(Expr::col(Balances::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(Balances::EstablishmentId).eq(establishment_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        row.map(|row| amount_from_db(row.try_get("amount")?))
            .transpose()
    }

    async fn write_balance(conn: &mut SqliteConnection, balance: &Balance) -> Result<()> {
        let query = Query::insert()
            .into_table(Balances::Table)
            .columns([
                Balances::UserId,
                Balances::EstablishmentId,
                Balances::Amount,
                Balances::UpdatedAt,
            ])
            .values_panic([
                balance.user_id.to_string().into(),
                balance.establishment_id.to_string().into(),
                amount_to_db(balance.amount)?.into(),
                format_timestamp(balance.updated_at).into(),
            ])
            .on_conflict(
                OnConflict::columns([Balances::UserId, Balances::EstablishmentId])
                    .update_columns([Balances::Amount, Balances::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn append_history(conn: &mut SqliteConnection, entry: &HistoryEntry) -> Result<()> {
        let query = Query::insert()
            .into_table(PointsHistory::Table)
            .columns(history_columns())
            .values_panic([
                entry.kind.as_str().into(),
                amount_to_db(entry.amount)?.into(),
                entry.user_id.to_string().into(),
                entry.establishment_id.to_string().into(),
                entry.receipt_id.map(|id| id.to_string()).into(),
                entry.description.clone().into(),
                amount_to_db(entry.balance_after)?.into(),
                format_timestamp(entry.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    async fn credit_in_tx(
        conn: &mut SqliteConnection,
        credit: &Credit,
        now: DateTime<Utc>,
    ) -> Result<Balance> {
        let current = Self::balance_in_tx(conn, credit.user_id, credit.establishment_id)
            .await?
            .unwrap_or(0);
        let amount = current.checked_add(credit.amount).ok_or_else(|| {
            StorageError::Unsupported(format!("balance {current} + {} overflows", credit.amount))
        })?;

        let balance = Balance {
            user_id: credit.user_id,
            establishment_id: credit.establishment_id,
            amount,
            updated_at: now,
        };
        Self::write_balance(conn, &balance).await?;
        Self::append_history(
            conn,
            &HistoryEntry {
                kind: HistoryKind::Earned,
                amount: credit.amount,
                user_id: credit.user_id,
                establishment_id: credit.establishment_id,
                receipt_id: credit.receipt_id,
                description: credit.description.clone(),
                balance_after: amount,
                created_at: now,
            },
        )
        .await?;

        Ok(balance)
    }

    async fn debit_in_tx(
        conn: &mut SqliteConnection,
        debit: &Debit,
        now: DateTime<Utc>,
    ) -> Result<DebitOutcome> {
        let available = Self::balance_in_tx(conn, debit.user_id, debit.establishment_id)
            .await?
            .unwrap_or(0);
        if available < debit.amount {
            return Ok(DebitOutcome::Insufficient { available });
        }

        let amount = available - debit.amount;
        let balance = Balance {
            user_id: debit.user_id,
            establishment_id: debit.establishment_id,
            amount,
            updated_at: now,
        };
        Self::write_balance(conn, &balance).await?;
        Self::append_history(
            conn,
            &HistoryEntry {
                kind: HistoryKind::Deducted,
                amount: debit.amount,
                user_id: debit.user_id,
                establishment_id: debit.establishment_id,
                receipt_id: None,
                description: debit.description.clone(),
                balance_after: amount,
                created_at: now,
            },
        )
        .await?;

        Ok(DebitOutcome::Debited(balance))
    }

    async fn claim_in_tx(
        conn: &mut SqliteConnection,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let query = Query::select()
            .columns(receipt_columns())
            .from(Receipts::Table)
            .and_where(Expr::col(Receipts::Code).eq(code.as_str()))
            .and_where(Expr::col(Receipts::EstablishmentId).eq(establishment_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&mut *conn).await? else {
            return Ok(ClaimOutcome::NotFound);
        };
        let mut receipt = receipt_from_row(&row)?;
        if !receipt.mark_claimed(user_id, now) {
            return Ok(ClaimOutcome::AlreadyClaimed(receipt));
        }

        let update = Query::update()
            .table(Receipts::Table)
            .values([
                (Receipts::Claimed, 1i64.into()),
                (Receipts::ClaimedBy, user_id.to_string().into()),
                (Receipts::ClaimedAt, format_timestamp(now).into()),
            ])
            .and_where(Expr::col(Receipts::Id).eq(receipt.id.to_string()))
            .and_where(Expr::col(Receipts::Claimed).eq(0i64))
            .to_string(SqliteQueryBuilder);

        let updated = sqlx::query(&update).execute(&mut *conn).await?;
        if updated.rows_affected() != 1 {
            return Err(StorageError::Conflict(format!(
                "receipt {code} changed during claim"
            )));
        }

        let credit = Credit {
            user_id,
            establishment_id,
            amount: receipt.amount,
            receipt_id: Some(receipt.id),
            description: format!("Claimed receipt {code}"),
        };
        let balance = Self::credit_in_tx(conn, &credit, now).await?;

        Ok(ClaimOutcome::Claimed { receipt, balance })
    }
}

#[async_trait]
impl ReceiptStore for SqliteLedger {
    async fn insert(&self, receipt: &Receipt) -> Result<()> {
        let query = Query::insert()
            .into_table(Receipts::Table)
            .columns(receipt_columns())
            .values_panic([
                receipt.id.to_string().into(),
                receipt.code.as_str().into(),
                receipt.establishment_id.to_string().into(),
                amount_to_db(receipt.amount)?.into(),
                i64::from(receipt.claimed).into(),
                receipt.claimed_by.map(|u| u.to_string()).into(),
                receipt.claimed_at.map(format_timestamp).into(),
                receipt.customer_phone.clone().into(),
                serde_json::to_string(&receipt.metadata)?.into(),
                format_timestamp(receipt.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StorageError::DuplicateIdentifier(receipt.code.to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn code_exists(&self, code: &ReceiptCode) -> Result<bool> {
        let query = Query::select()
            .column(Receipts::Id)
            .from(Receipts::Table)
            .and_where(Expr::col(Receipts::Code).eq(code.as_str()))
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn find(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Receipt>> {
        let query = Query::select()
            .columns(receipt_columns())
            .from(Receipts::Table)
            .and_where(Expr::col(Receipts::Code).eq(code.as_str()))
            .and_where(Expr::col(Receipts::EstablishmentId).eq(establishment_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(receipt_from_row).transpose()
    }

    async fn claim(
        &self,
        code: &ReceiptCode,
        establishment_id: EstablishmentId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::claim_in_tx(tx.conn(), code, establishment_id, user_id, now).await;
        tx.finish(result).await
    }

    async fn list(
        &self,
        establishment_id: EstablishmentId,
        filter: ReceiptFilter,
        page: PageRequest,
    ) -> Result<Page<Receipt>> {
        let condition = receipt_condition(establishment_id, &filter);

        let count_query = Query::select()
            .expr(Expr::col(Receipts::Id).count())
            .from(Receipts::Table)
            .cond_where(condition.clone())
            .to_string(SqliteQueryBuilder);
        let total: i64 = sqlx::query(&count_query)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let query = Query::select()
            .columns(receipt_columns())
            .from(Receipts::Table)
            .cond_where(condition)
            .order_by(Receipts::CreatedAt, Order::Desc)
            .order_by_expr(Expr::cust("rowid"), Order::Desc)
            .limit(u64::from(page.limit))
            .offset(page.offset())
            .to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let items = rows
            .iter()
            .map(receipt_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: amount_from_db(total)?,
            page: page.page,
            limit: page.limit,
        })
    }
}

#[async_trait]
impl PointsStore for SqliteLedger {
    async fn credit(&self, credit: Credit, now: DateTime<Utc>) -> Result<Balance> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::credit_in_tx(tx.conn(), &credit, now).await;
        tx.finish(result).await
    }

    async fn debit(&self, debit: Debit, now: DateTime<Utc>) -> Result<DebitOutcome> {
        let mut tx = WriteTx::begin(&self.pool).await?;
        let result = Self::debit_in_tx(tx.conn(), &debit, now).await;
        tx.finish(result).await
    }

    async fn balance(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Option<Balance>> {
        let query = Query::select()
            .columns([
                Balances::UserId,
                Balances::EstablishmentId,
                Balances::Amount,
                Balances::UpdatedAt,
            ])
            .from(Balances::Table)
            .and_where(Expr::col(Balances::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(Balances::EstablishmentId).eq(establishment_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        let query = Query::select()
            .columns([
                Balances::UserId,
                Balances::EstablishmentId,
                Balances::Amount,
                Balances::UpdatedAt,
            ])
            .from(Balances::Table)
            .and_where(Expr::col(Balances::UserId).eq(user_id.to_string()))
            .order_by(Balances::EstablishmentId, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(balance_from_row).collect()
    }

    async fn history(
        &self,
        establishment_id: EstablishmentId,
        filter: HistoryFilter,
        page: PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let condition = history_condition(establishment_id, &filter);

        let count_query = Query::select()
            .expr(Expr::col(PointsHistory::Seq).count())
            .from(PointsHistory::Table)
            .cond_where(condition.clone())
            .to_string(SqliteQueryBuilder);
        let total: i64 = sqlx::query(&count_query)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;

        let query = Query::select()
            .columns(history_columns())
            .from(PointsHistory::Table)
            .cond_where(condition)
            .order_by(PointsHistory::CreatedAt, Order::Desc)
            .order_by(PointsHistory::Seq, Order::Desc)
            .limit(u64::from(page.limit))
            .offset(page.offset())
            .to_string(SqliteQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let items = rows
            .iter()
            .map(history_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: amount_from_db(total)?,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn pair_history(
        &self,
        user_id: UserId,
        establishment_id: EstablishmentId,
    ) -> Result<Vec<HistoryEntry>> {
        let query = Query::select()
            .columns(history_columns())
            .from(PointsHistory::Table)
            .and_where(Expr::col(PointsHistory::UserId).eq(user_id.to_string()))
            .and_where(Expr::col(PointsHistory::EstablishmentId).eq(establishment_id.to_string()))
            .order_by(PointsHistory::Seq, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(history_from_row).collect()
    }
}
